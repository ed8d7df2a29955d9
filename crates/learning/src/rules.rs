//! Structural-mistake rules.
//!
//! A small fixed table of parameter-name mistakes the oracle makes over and
//! over for specific tools. A rule hit produces a concrete
//! [`ParameterCorrection`](crate::records::ParameterCorrection) without any
//! external lookup, so these corrections carry high confidence.

use serde_json::Value;

use crate::records::ParameterCorrection;

/// One known parameter-name mistake for a specific tool.
#[derive(Debug, Clone, Copy)]
pub struct StructuralRule {
    pub tool_name: &'static str,
    /// The parameter name the oracle keeps using.
    pub wrong_param: &'static str,
    /// The parameter name the tool actually accepts.
    pub right_param: &'static str,
}

/// Known mistakes, checked in order. First hit wins.
pub const STRUCTURAL_RULES: &[StructuralRule] = &[
    StructuralRule {
        tool_name: "browse_website",
        wrong_param: "link",
        right_param: "url",
    },
    StructuralRule {
        tool_name: "browse_website",
        wrong_param: "website",
        right_param: "url",
    },
    StructuralRule {
        tool_name: "web_search",
        wrong_param: "q",
        right_param: "query",
    },
    StructuralRule {
        tool_name: "http_request",
        wrong_param: "uri",
        right_param: "url",
    },
];

/// Try the rule table against a failed call.
///
/// A rule matches when the tool name is an exact match and the original
/// params carry the wrong key (and not already the right one). The returned
/// correction renames the key, preserving the value and all other params.
pub fn match_rule(tool_name: &str, params: &Value) -> Option<ParameterCorrection> {
    let obj = params.as_object()?;

    for rule in STRUCTURAL_RULES {
        if rule.tool_name == tool_name
            && obj.contains_key(rule.wrong_param)
            && !obj.contains_key(rule.right_param)
        {
            let mut corrected = obj.clone();
            if let Some(value) = corrected.remove(rule.wrong_param) {
                corrected.insert(rule.right_param.to_string(), value);
            }
            return Some(ParameterCorrection {
                tool_name: tool_name.to_string(),
                original_params: params.clone(),
                corrected_params: Value::Object(corrected),
            });
        }
    }
    None
}
