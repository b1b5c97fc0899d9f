//! Prompt templates for the completion endpoint.
//!
//! The analysis prompt is rendered deterministically: months are sorted and
//! file blocks are ordered by (month, filename), so identical inputs produce
//! byte-identical prompt text.

use crate::aggregate::MonthFileContent;
use crate::error::Result;
use crate::llm::types::SamplingParams;
use crate::month::{forecast_horizon, forecast_months, sorted_unique_months};

pub const SYSTEM_PROMPT_ANALYSIS: &str = "你是一个专业的财务分析师，擅长从各种格式的财务文件中提取关键信息并进行趋势分析和预测。请严格按照要求的JSON格式输出结果，不要添加任何解释文字。特别注意：advice字段必须包含分析结论、关键风险预警、决策建议三个子字段，不能为空。";

pub const MATH_MARKDOWN_TIP: &str =
    "对于数学公式，请用标准Markdown数学公式语法输出所有公式，行内公式用$...$，块级公式用$$...$$。";

const SYSTEM_PROMPT_QA_FAST: &str = "你是一个高效的智能助手，请简明扼要地回答用户问题。";
const SYSTEM_PROMPT_QA_DEEP: &str =
    "你是一个专业的财务分析师，请详细、条理清晰、专业地回答用户问题。";

pub const ANALYSIS_SAMPLING: SamplingParams = SamplingParams {
    temperature: 0.1,
    max_tokens: 4096,
};

pub const REPORT_SAMPLING: SamplingParams = SamplingParams {
    temperature: 0.2,
    max_tokens: 2048,
};

/// The literal output schema the model must imitate. Kept as one block so
/// the example stays byte-for-byte identical across renders.
const JSON_EXAMPLE: &str = r#"{
  "line": [
    {"month": "2024-10", "收入": 1000000, "利润": 200000, "净利润率": 0.2},
    {"month": "2024-11", "收入": 1100000, "利润": 220000, "净利润率": 0.2},
    {"month": "2025-02", "收入": 1200000, "利润": 240000, "净利润率": 0.2}
  ],
  "bar": [
    {"month": "2025-02", "余额": 500000},
    {"month": "2025-03", "余额": 550000},
    {"month": "2025-04", "余额": 600000}
  ],
  "area": [
    {"month": "2025-02", "经营": 0.6, "投资": 0.3, "筹资": 0.1},
    {"month": "2025-03", "经营": 0.65, "投资": 0.25, "筹资": 0.1},
    {"month": "2025-04", "经营": 0.7, "投资": 0.2, "筹资": 0.1}
  ],
  "advice": {
    "分析结论": "基于历史数据分析，公司收入呈现稳定增长趋势，利润率保持稳定。",
    "关键风险预警": "需要关注现金流波动和季节性影响。",
    "决策建议": "建议加强现金流管理，优化投资结构。"
  }
}"#;

/// Interactive Q&A modes and their sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QaMode {
    Fast,
    Deep,
}

impl QaMode {
    pub fn system_prompt(&self) -> String {
        let base = match self {
            QaMode::Fast => SYSTEM_PROMPT_QA_FAST,
            QaMode::Deep => SYSTEM_PROMPT_QA_DEEP,
        };
        format!("{} {}", base, MATH_MARKDOWN_TIP)
    }

    pub fn sampling(&self) -> SamplingParams {
        match self {
            QaMode::Fast => SamplingParams {
                temperature: 0.8,
                max_tokens: 512,
            },
            QaMode::Deep => SamplingParams {
                temperature: 0.2,
                max_tokens: 2048,
            },
        }
    }
}

/// System prompt for the free-form report analysis call.
pub fn report_system_prompt() -> String {
    format!("{} {}", SYSTEM_PROMPT_QA_DEEP, MATH_MARKDOWN_TIP)
}

/// Renders one file block the way the analysis prompt embeds it.
fn render_file_block(block: &MonthFileContent) -> String {
    format!(
        "时间戳: {}\n文件名: {}\n文件类型: {}\n文件内容:\n{}\n{}",
        block.month,
        block.filename,
        block.file_type,
        block.content,
        "=".repeat(50)
    )
}

/// Builds the multi-month analysis prompt.
///
/// `months` may arrive unsorted and with duplicates; the rendered history
/// range is always the sorted unique set. Without a base month the forecast
/// range is empty and the prompt says so instead of failing.
pub fn build_analysis_prompt(
    months: &[String],
    base_month: Option<&str>,
    blocks: &[MonthFileContent],
) -> Result<String> {
    let history = sorted_unique_months(months.iter().cloned());
    let history_str = history.join(", ");

    let predict_count = forecast_horizon(history.len());
    let predict = match base_month {
        Some(base) => forecast_months(base, predict_count)?,
        None => Vec::new(),
    };
    let predict_str = if predict.is_empty() {
        "（无预测月份）".to_string()
    } else {
        predict.join(", ")
    };

    let base_month_line = match base_month {
        Some(base) => format!("基准月份为{base}，M0代表{base}，M+1为下一个月，以此类推。"),
        None => "未提供基准月份，无需输出预测区间。".to_string(),
    };

    let mut ordered: Vec<&MonthFileContent> = blocks.iter().collect();
    ordered.sort_by(|a, b| (&a.month, &a.filename).cmp(&(&b.month, &b.filename)));
    let files_content = ordered
        .iter()
        .map(|b| render_file_block(b))
        .collect::<Vec<_>>()
        .join("\n");

    Ok(format!(
        r#"
你是一个专业的财务分析师，请根据以下财务数据文件进行智能分析和预测。

{base_month_line}

请仔细分析以下文件内容，每个文件都标注了对应的时间戳（YYYY-MM格式）。对于表格文件，请识别其中的财务数据；对于其他文件，请提取相关的财务信息：

{files_content}

基于以上数据，请进行以下分析并输出结构化JSON：

1. **收入/利润/净利润率趋势分析**：
   - 历史区间务必输出以下月份：{history_str}
   - 预测区间务必输出以下月份：{predict_str}
   - month字段必须严格等于上述区间的YYYY-MM
   - 输出line字段，包含历史和预测数据，字段：month（YYYY-MM格式）、收入、利润、净利润率

2. **现金流预测**：
   - bar字段历史区间务必输出所有上传的历史月份（YYYY-MM），预测区间为基准月份后{predict_count}个月
   - 输出bar字段，字段：month（YYYY-MM格式）、余额
   - area字段历史区间务必输出所有上传的历史月份（YYYY-MM），预测区间为基准月份后{predict_count}个月
   - 预测未来{predict_count}个月经营/投资/筹资活动现金流出占比
   - 输出area字段，字段：month（YYYY-MM格式）、经营、投资、筹资

3. **决策建议（必须包含，要求专业、详细、可操作）**：
   - **分析结论**：结合财务报表的主要指标（如收入、利润、净利润率、现金流等）和趋势，给出条理清晰、专业的分析结论，指出企业当前的经营状况、财务结构、成长性等。
   - **关键风险预警**：结合数据，具体指出潜在的财务风险点（如现金流断裂、盈利能力下滑、负债率过高、成本异常等），并说明预警理由。
   - **决策建议**：基于分析结论和风险预警，给出具体、可操作的改进措施或战略建议（如优化成本结构、加强现金流管理、调整投资策略、提升某项指标等），建议尽量量化目标或给出管理建议。

**重要要求**：
- 只输出JSON格式，不要任何解释文字
- month字段统一使用YYYY-MM格式
- 数值字段使用数字类型，金额单位为元
- 净利润率为小数形式（如0.2表示20%）
- 现金流占比为小数形式，总和为1.0
- **advice字段必须包含三个子字段，不能为空**
- 严格按照以下JSON结构输出：

{JSON_EXAMPLE}"#
    ))
}

/// Builds the interactive Q&A user prompt: the question, optionally followed
/// by the decoded content of an attached file.
pub fn build_question_prompt(question: &str, file: Option<(&str, &str)>) -> String {
    match file {
        Some((file_type, content)) if !content.is_empty() => format!(
            "{}\n\n以下是用户上传的{}文件内容：\n{}",
            question, file_type, content
        ),
        _ => question.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(month: &str, filename: &str, content: &str) -> MonthFileContent {
        MonthFileContent {
            month: month.to_string(),
            filename: filename.to_string(),
            file_type: "csv".to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_prompt_is_deterministic_under_reordering() {
        let months_a = vec!["2024-11".to_string(), "2024-10".to_string()];
        let months_b = vec!["2024-10".to_string(), "2024-11".to_string()];
        let blocks_a = vec![block("2024-11", "b.csv", "x"), block("2024-10", "a.csv", "y")];
        let blocks_b = vec![block("2024-10", "a.csv", "y"), block("2024-11", "b.csv", "x")];

        let p1 = build_analysis_prompt(&months_a, Some("2024-11"), &blocks_a).unwrap();
        let p2 = build_analysis_prompt(&months_b, Some("2024-11"), &blocks_b).unwrap();
        assert_eq!(p1, p2);
    }

    #[test]
    fn test_prompt_embeds_ranges_and_example() {
        let months = vec!["2024-10".to_string(), "2024-11".to_string()];
        let blocks = vec![block("2024-10", "a.csv", "科目\t金额")];
        let prompt = build_analysis_prompt(&months, Some("2024-11"), &blocks).unwrap();

        assert!(prompt.contains("历史区间务必输出以下月份：2024-10, 2024-11"));
        assert!(prompt.contains("预测区间务必输出以下月份：2024-12, 2025-01, 2025-02"));
        assert!(prompt.contains("时间戳: 2024-10"));
        assert!(prompt.contains("文件名: a.csv"));
        assert!(prompt.contains("\"分析结论\""));
        assert!(prompt.contains(&"=".repeat(50)));
    }

    #[test]
    fn test_prompt_without_base_month_degrades() {
        let months = vec!["2024-10".to_string()];
        let prompt = build_analysis_prompt(&months, None, &[]).unwrap();
        assert!(prompt.contains("未提供基准月份"));
        assert!(prompt.contains("（无预测月份）"));
    }

    #[test]
    fn test_horizon_grows_past_a_year_of_history() {
        let mut months: Vec<String> = (1..=12).map(|i| format!("2024-{:02}", i)).collect();
        months.push("2025-01".to_string());
        let prompt = build_analysis_prompt(&months, Some("2025-01"), &[]).unwrap();
        assert!(prompt.contains(
            "预测区间务必输出以下月份：2025-02, 2025-03, 2025-04, 2025-05, 2025-06, 2025-07"
        ));
    }

    #[test]
    fn test_question_prompt_with_and_without_file() {
        assert_eq!(build_question_prompt("利润率怎么算？", None), "利润率怎么算？");
        let with_file = build_question_prompt("分析该表", Some(("csv", "科目,金额")));
        assert!(with_file.starts_with("分析该表"));
        assert!(with_file.contains("以下是用户上传的csv文件内容：\n科目,金额"));
    }

    #[test]
    fn test_qa_mode_parameters() {
        assert_eq!(QaMode::Fast.sampling().temperature, 0.8);
        assert_eq!(QaMode::Fast.sampling().max_tokens, 512);
        assert_eq!(QaMode::Deep.sampling().temperature, 0.2);
        assert_eq!(QaMode::Deep.sampling().max_tokens, 2048);
        assert!(QaMode::Deep.system_prompt().contains(MATH_MARKDOWN_TIP));
    }
}
