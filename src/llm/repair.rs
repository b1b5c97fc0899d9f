//! Repair and validation of raw model output.
//!
//! Models wrap JSON in code fences, prepend prose, or drop required advisory
//! fields. The steps here run in order, each only if the previous one did
//! not already produce valid JSON: fence stripping, direct parse, balanced
//! object extraction, balanced array extraction. The balanced scan is a real
//! bracket matcher that tracks string literals and escapes, so nested
//! structures survive where a greedy pattern would not.

use crate::error::{AnalysisError, Result};
use crate::month::is_valid_month;
use crate::schema::AnalysisResult;
use log::warn;
use serde_json::{json, Value};

const ADVICE_KEYS: [&str; 3] = ["分析结论", "关键风险预警", "决策建议"];

const DEFAULT_ADVICE: [(&str, &str); 3] = [
    (
        "分析结论",
        "基于上传的财务数据进行分析，建议进一步补充更多历史数据以获得更准确的趋势分析。",
    ),
    (
        "关键风险预警",
        "数据量有限，预测准确性可能受到影响，建议持续监控关键财务指标。",
    ),
    (
        "决策建议",
        "建议增加数据收集频率，完善财务分析体系，定期进行财务健康检查。",
    ),
];

/// Removes a surrounding fenced code block (triple backtick, optional
/// language tag) if present.
pub fn strip_code_fences(text: &str) -> String {
    let mut out = text.trim();
    if let Some(rest) = out.strip_prefix("```") {
        let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
        out = rest.trim_start();
        if let Some(rest) = out.strip_suffix("```") {
            out = rest.trim_end();
        }
    }
    out.to_string()
}

fn find_balanced(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(&text[start..start + idx + c.len_utf8()]);
            }
        }
    }
    None
}

/// First complete balanced JSON object embedded in noisy text.
pub fn extract_first_json_object(text: &str) -> Option<&str> {
    find_balanced(text, '{', '}')
}

/// First complete balanced JSON array embedded in noisy text.
pub fn extract_first_json_array(text: &str) -> Option<&str> {
    find_balanced(text, '[', ']')
}

/// Recovers a JSON value from raw model text, or fails carrying the raw
/// text for diagnostics.
pub fn parse_model_json(raw: &str) -> Result<Value> {
    let stripped = strip_code_fences(raw);

    if let Ok(value) = serde_json::from_str(&stripped) {
        return Ok(value);
    }
    if let Some(candidate) = extract_first_json_object(&stripped) {
        if let Ok(value) = serde_json::from_str(candidate) {
            return Ok(value);
        }
    }
    if let Some(candidate) = extract_first_json_array(&stripped) {
        if let Ok(value) = serde_json::from_str(candidate) {
            return Ok(value);
        }
    }
    Err(AnalysisError::ResponseParse {
        raw: raw.to_string(),
    })
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(m) => m.is_empty(),
        _ => false,
    }
}

fn repair_advice(root: &mut serde_json::Map<String, Value>) {
    let needs_full_default = match root.get("advice") {
        None => true,
        Some(advice) => is_blank(advice) || !advice.is_object(),
    };

    if needs_full_default {
        warn!("advice missing from model output, filling defaults");
        let advice: serde_json::Map<String, Value> = DEFAULT_ADVICE
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect();
        root.insert("advice".to_string(), Value::Object(advice));
        return;
    }

    if let Some(advice) = root.get_mut("advice").and_then(Value::as_object_mut) {
        for key in ADVICE_KEYS {
            let blank = advice.get(key).map(is_blank).unwrap_or(true);
            if blank {
                warn!("advice field {} missing from model output, filling placeholder", key);
                advice.insert(key.to_string(), json!(format!("需要补充{}内容", key)));
            }
        }
    }
}

fn classify_line(root: &mut serde_json::Map<String, Value>, uploaded_months: &[String]) {
    let mut history: Vec<&String> = uploaded_months
        .iter()
        .filter(|m| is_valid_month(m))
        .collect();
    history.sort();
    let last_history = history.last().map(|m| m.as_str());

    let Some(Value::Array(line)) = root.get_mut("line") else {
        return;
    };
    for entry in line {
        let Some(obj) = entry.as_object_mut() else {
            continue;
        };
        let month = obj.get("month").and_then(Value::as_str);
        let Some(month) = month else { continue };
        if !is_valid_month(month) {
            continue;
        }
        let kind = match last_history {
            Some(last) if month <= last => "history",
            _ => "predict",
        };
        obj.insert("type".to_string(), json!(kind));
    }
}

/// Post-parse repair: default-fills the advisory triple and classifies every
/// well-formed trend-line month as history or predict relative to the last
/// uploaded month. Idempotent: repairing an already repaired value changes
/// nothing.
pub fn repair_analysis(value: &mut Value, uploaded_months: &[String]) {
    let Some(root) = value.as_object_mut() else {
        return;
    };
    repair_advice(root);
    classify_line(root, uploaded_months);
}

/// Full validator path: raw model text to a typed [`AnalysisResult`].
pub fn parse_analysis(raw: &str, uploaded_months: &[String]) -> Result<AnalysisResult> {
    let mut value = parse_model_json(raw)?;
    repair_analysis(&mut value, uploaded_months);
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PointKind;

    const TARGET_SCHEMA_RESPONSE: &str = r#"{
        "line": [
            {"month": "2024-10", "收入": 1000, "type": "history"},
            {"month": "2025-01", "收入": 1200, "type": "predict"}
        ],
        "bar": [{"month": "2024-10", "余额": 500}],
        "area": [{"month": "2024-10", "经营": 0.6, "投资": 0.3, "筹资": 0.1}],
        "advice": {
            "分析结论": "收入稳定。",
            "关键风险预警": "现金流偏紧。",
            "决策建议": "控制成本。"
        }
    }"#;

    fn months(list: &[&str]) -> Vec<String> {
        list.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn test_round_trip_without_repair() {
        let result =
            parse_analysis(TARGET_SCHEMA_RESPONSE, &months(&["2024-10", "2024-11"])).unwrap();
        assert_eq!(result.line.len(), 2);
        assert_eq!(result.line[0].kind, Some(PointKind::History));
        assert_eq!(result.line[1].kind, Some(PointKind::Predict));
        assert_eq!(result.advice.conclusion, "收入稳定。");
        assert_eq!(result.bar.len(), 1);
        assert_eq!(result.area.len(), 1);

        // field-for-field equal to its own re-parse
        let reserialized = serde_json::to_string(&result).unwrap();
        let again = parse_analysis(&reserialized, &months(&["2024-10", "2024-11"])).unwrap();
        assert_eq!(result, again);
    }

    #[test]
    fn test_repair_is_idempotent() {
        let mut value = parse_model_json(r#"{"line":[{"month":"2024-10"}],"bar":[],"area":[]}"#).unwrap();
        let uploaded = months(&["2024-10"]);
        repair_analysis(&mut value, &uploaded);
        let once = value.clone();
        repair_analysis(&mut value, &uploaded);
        assert_eq!(once, value);
    }

    #[test]
    fn test_fenced_block_with_empty_advice() {
        let raw = "```json\n{\"line\":[],\"bar\":[],\"area\":[],\"advice\":{}}\n```";
        let result = parse_analysis(raw, &[]).unwrap();
        assert!(!result.advice.conclusion.is_empty());
        assert!(!result.advice.risk_warning.is_empty());
        assert!(!result.advice.recommendation.is_empty());
    }

    #[test]
    fn test_missing_advice_gets_default_triple() {
        let result = parse_analysis(r#"{"line":[],"bar":[],"area":[]}"#, &[]).unwrap();
        assert!(result.advice.conclusion.contains("财务数据"));
        assert!(!result.advice.risk_warning.is_empty());
        assert!(!result.advice.recommendation.is_empty());
    }

    #[test]
    fn test_partial_advice_gets_named_placeholders() {
        let raw = r#"{"line":[],"bar":[],"area":[],"advice":{"分析结论":"还行"}}"#;
        let result = parse_analysis(raw, &[]).unwrap();
        assert_eq!(result.advice.conclusion, "还行");
        assert_eq!(result.advice.risk_warning, "需要补充关键风险预警内容");
        assert_eq!(result.advice.recommendation, "需要补充决策建议内容");
    }

    #[test]
    fn test_history_predict_classification() {
        let raw = r#"{"line":[
            {"month":"2024-11"},
            {"month":"2025-01"},
            {"month":"十一月"},
            {"收入": 1}
        ],"bar":[],"area":[]}"#;
        let result = parse_analysis(raw, &months(&["2024-10", "2024-11"])).unwrap();
        assert_eq!(result.line[0].kind, Some(PointKind::History));
        assert_eq!(result.line[1].kind, Some(PointKind::Predict));
        // malformed or missing months stay untouched
        assert_eq!(result.line[2].kind, None);
        assert_eq!(result.line[3].kind, None);
    }

    #[test]
    fn test_extraction_survives_prose_and_nesting() {
        let raw = r#"好的，以下是分析结果：
{"line":[{"month":"2024-10","明细":{"主营":1,"其他":2}}],"bar":[],"area":[],"advice":{}}
希望对您有帮助。"#;
        let result = parse_analysis(raw, &months(&["2024-10"])).unwrap();
        assert_eq!(result.line.len(), 1);
        assert_eq!(result.line[0].metrics["明细"]["主营"], json!(1));
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_scanner() {
        let raw = r#"注意 {"advice":{"分析结论":"包含}括号{的文本","关键风险预警":"x","决策建议":"y"},"line":[],"bar":[],"area":[]} 完毕"#;
        let result = parse_analysis(raw, &[]).unwrap();
        assert_eq!(result.advice.conclusion, "包含}括号{的文本");
    }

    #[test]
    fn test_array_fallback() {
        let extracted = extract_first_json_array("prose [1, [2, 3]] more").unwrap();
        assert_eq!(extracted, "[1, [2, 3]]");
    }

    #[test]
    fn test_unrecoverable_text_keeps_raw() {
        let err = parse_analysis("完全不是JSON", &[]).unwrap_err();
        match err {
            AnalysisError::ResponseParse { raw } => assert_eq!(raw, "完全不是JSON"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_strip_code_fences_variants() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("```\n[]\n```"), "[]");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }
}
