//! Shared detection patterns.
//!
//! Regexes and keyword tables used by the deterministic checks, the
//! precondition heuristics and the kwargs extractor. Transcripts are Chinese
//! chat, so most tables are Chinese keywords; full-width and half-width
//! punctuation are both matched.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // =========================================================================
    // RESPONSE SHAPE PATTERNS
    // =========================================================================

    /// Question mark, full-width or ASCII
    pub static ref QUESTION_MARK_PATTERN: Regex = Regex::new(r"[?？]").unwrap();

    /// Short explanation wrapped in quotes or brackets, e.g. `“空腹血糖”（早上没吃饭时测的）`
    pub static ref QUOTE_OR_BRACKET_PATTERN: Regex = Regex::new(
        r#"[“"「『（(【\[][^“”"「」『』（）()【】\[\]\n]{1,40}[”"」』）)】\]]"#
    ).unwrap();

    /// Numbered list marker at a line start or after a clause break.
    /// `3.5` style decimals are excluded by requiring a non-digit after the marker.
    pub static ref NUMBERED_LIST_PATTERN: Regex = Regex::new(
        r"(?m)(?:^|[\s：:。；;，,])(\d{1,2})[.、．)）]\s*[^\d\s]"
    ).unwrap();

    /// Circled-number or bullet list markers
    pub static ref BULLET_LIST_PATTERN: Regex = Regex::new(
        r"(?m)(?:^|\s)(?:[①②③④⑤⑥⑦⑧⑨⑩]|[-•·*]\s)"
    ).unwrap();

    // =========================================================================
    // USER FACT PATTERNS
    // =========================================================================

    /// Stated age, e.g. `我今年65岁`, `72 周岁`
    pub static ref AGE_PATTERN: Regex = Regex::new(r"(\d{1,3})\s*(?:周岁|岁)").unwrap();

    /// Mainland mobile number
    pub static ref PHONE_PATTERN: Regex = Regex::new(r"(?:^|\D)(1[3-9]\d{9})(?:\D|$)").unwrap();

    /// Hospital or clinic name
    pub static ref HOSPITAL_PATTERN: Regex = Regex::new(
        r"[\p{Han}A-Za-z0-9]{2,12}(?:医院|诊所|卫生院|医疗中心)"
    ).unwrap();
}

/// Terms that show the reply is asking about gender.
pub const GENDER_TERMS: &[&str] = &["是男是女", "先生还是女士", "性别", "男", "女"];

/// Question particles that mark a sentence as a question without a `？`.
pub const QUESTION_PARTICLES: &[&str] = &["吗", "呢", "么"];

/// Medication mentions.
pub const MEDICATION_KEYWORDS: &[&str] = &["吃药", "服药", "药物", "用药", "药", "治疗"];

/// Past visit mentions.
pub const VISITED_KEYWORDS: &[&str] = &["去过医院", "看过医生", "就诊", "去过", "看过"];

/// Negated visit mentions. Checked before [`VISITED_KEYWORDS`].
pub const NOT_VISITED_KEYWORDS: &[&str] = &[
    "没去医院",
    "没去过医院",
    "没有去医院",
    "没看过医生",
    "没看医生",
    "还没就诊",
    "没有就诊",
    "没去看",
    "还没去",
    "没看过",
];

/// Exam or report mentions.
pub const EXAM_KEYWORDS: &[&str] = &["检查", "体检", "化验", "测试", "诊断", "报告", "结果", "单子"];

/// Requests for advice.
pub const ADVICE_KEYWORDS: &[&str] = &[
    "怎么办", "建议", "能不能", "可以吗", "该怎么", "怎么吃", "有用吗", "管用", "要不要",
];

/// Markers of a concrete question from the user.
pub const QUESTION_MARKERS: &[&str] = &[
    "？", "?", "吗", "怎么", "如何", "什么", "为什么", "能不能", "是否", "多少", "哪",
];

/// Refusal phrasing.
pub const REFUSAL_KEYWORDS: &[&str] = &[
    "不方便", "不想留", "不留", "不给", "不用了", "算了", "不需要", "不想给", "拒绝",
];

/// Phone number mentions.
pub const PHONE_TERMS: &[&str] = &["电话", "手机", "号码"];

/// WeChat mentions.
pub const WECHAT_TERMS: &[&str] = &["微信", "vx", "VX", "wx"];

/// Mental health mentions.
pub const MENTAL_HEALTH_KEYWORDS: &[&str] = &[
    "焦虑", "抑郁", "失眠", "压力大", "心理", "情绪", "崩溃", "烦躁", "想不开",
];

/// Common condition names, used for multi-condition detection and `dx` extraction.
pub const DISEASE_KEYWORDS: &[&str] = &[
    "糖尿病", "高血压", "高血脂", "冠心病", "心脏病", "脑梗", "中风", "痛风", "胃炎", "肝炎",
    "脂肪肝", "肾病", "肺炎", "哮喘", "甲亢", "甲减", "关节炎", "颈椎病", "腰椎间盘突出",
    "抑郁症", "焦虑症", "失眠症", "贫血", "肿瘤", "癌",
];

/// Count question marks in content.
pub fn count_questions(content: &str) -> usize {
    QUESTION_MARK_PATTERN.find_iter(content).count()
}

/// Check if content contains any of the keywords.
pub fn contains_any(content: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| content.contains(k))
}

/// First keyword (in table order) found in content.
pub fn first_keyword<'a>(content: &str, keywords: &[&'a str]) -> Option<&'a str> {
    keywords.iter().copied().find(|k| content.contains(k))
}

/// Number of distinct keywords found in content.
pub fn distinct_keywords(content: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| content.contains(*k)).count()
}

/// Highest age stated in content.
pub fn max_age(content: &str) -> Option<u32> {
    AGE_PATTERN
        .captures_iter(content)
        .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
        .max()
}

/// Check if content contains a mobile number.
pub fn contains_phone(content: &str) -> bool {
    PHONE_PATTERN.is_match(content)
}

/// Number of numbered list markers in content.
pub fn count_list_markers(content: &str) -> usize {
    NUMBERED_LIST_PATTERN.find_iter(content).count()
}

/// Check if content reads as a question.
pub fn reads_as_question(content: &str) -> bool {
    count_questions(content) > 0 || contains_any(content, QUESTION_PARTICLES)
}
