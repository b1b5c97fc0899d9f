use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A monetary cell as it came out of a source table. Numbers stay numbers,
/// free-text amounts stay verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(f64),
    Text(String),
}

/// One extracted table row. Transient: produced by the extractor, consumed by
/// the prompt builder or returned directly, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialFact {
    pub file: String,
    pub subject: String,
    pub amount: Amount,
    pub date: String,
}

/// Coarse file classification inferred from the filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Spreadsheet,
    Text,
    Image,
    Binary,
}

impl FileKind {
    pub fn from_name(filename: &str) -> Self {
        match file_type_tag(filename).as_str() {
            "xlsx" | "xls" | "csv" => Self::Spreadsheet,
            "txt" | "md" | "json" | "log" => Self::Text,
            "png" | "jpg" | "jpeg" | "bmp" | "gif" => Self::Image,
            _ => Self::Binary,
        }
    }
}

/// Lowercased extension without the dot; empty when the name has none.
/// This string also tags each file block in the analysis prompt.
pub fn file_type_tag(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

/// Classification of a trend-line point relative to the last uploaded month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointKind {
    History,
    Predict,
}

/// One entry of the trend line. The metric columns (收入, 利润, 净利润率, ...)
/// are model-chosen and flow through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PointKind>,
    #[serde(flatten)]
    pub metrics: serde_json::Map<String, Value>,
}

/// The three-part textual advisory. After repair all keys are non-empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Advice {
    #[serde(rename = "分析结论", default)]
    pub conclusion: String,
    #[serde(rename = "关键风险预警", default)]
    pub risk_warning: String,
    #[serde(rename = "决策建议", default)]
    pub recommendation: String,
}

/// The validated analytics payload returned to the caller. Constructed fresh
/// per request from the model's raw text and discarded after the response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub line: Vec<TrendPoint>,
    #[serde(default)]
    pub bar: Vec<Value>,
    #[serde(default)]
    pub area: Vec<Value>,
    #[serde(default)]
    pub advice: Advice,
}

/// One parsed sheet of an uploaded report workbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetData {
    pub name: String,
    pub columns: Vec<String>,
    /// Row objects keyed by column name, capped at 100 rows.
    pub data: Vec<Value>,
}

/// Preview of a stored file: a string grid for tables, a data URL for images.
#[derive(Debug, Clone, PartialEq)]
pub enum FilePreview {
    Table(Vec<Vec<String>>),
    Image(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind_from_name() {
        assert_eq!(FileKind::from_name("a.xlsx"), FileKind::Spreadsheet);
        assert_eq!(FileKind::from_name("b.csv"), FileKind::Spreadsheet);
        assert_eq!(FileKind::from_name("c.txt"), FileKind::Text);
        assert_eq!(FileKind::from_name("d.png"), FileKind::Image);
        assert_eq!(FileKind::from_name("e.zip"), FileKind::Binary);
        assert_eq!(FileKind::from_name("noext"), FileKind::Binary);
    }

    #[test]
    fn test_amount_serializes_untagged() {
        let n = serde_json::to_string(&Amount::Number(12.5)).unwrap();
        assert_eq!(n, "12.5");
        let t = serde_json::to_string(&Amount::Text("约1200".into())).unwrap();
        assert_eq!(t, "\"约1200\"");
    }

    #[test]
    fn test_trend_point_round_trip_keeps_metrics() {
        let raw = r#"{"month":"2024-10","收入":1000000,"利润":200000,"type":"history"}"#;
        let point: TrendPoint = serde_json::from_str(raw).unwrap();
        assert_eq!(point.month.as_deref(), Some("2024-10"));
        assert_eq!(point.kind, Some(PointKind::History));
        assert_eq!(point.metrics["收入"], serde_json::json!(1000000));

        let back = serde_json::to_value(&point).unwrap();
        assert_eq!(back["type"], "history");
        assert_eq!(back["利润"], serde_json::json!(200000));
    }

    #[test]
    fn test_advice_uses_chinese_wire_keys() {
        let advice = Advice {
            conclusion: "结论".into(),
            risk_warning: "风险".into(),
            recommendation: "建议".into(),
        };
        let value = serde_json::to_value(&advice).unwrap();
        assert_eq!(value["分析结论"], "结论");
        assert_eq!(value["关键风险预警"], "风险");
        assert_eq!(value["决策建议"], "建议");
    }
}
