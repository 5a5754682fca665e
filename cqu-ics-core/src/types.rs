use std::{fmt, sync::LazyLock, time::Duration};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// 用户凭据（教学管理系统的学号与密码）
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// 学号
    pub username: String,
    /// 密码，只用于派生登录摘要，绝不写入日志
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// 模拟 IE11 的 User-Agent。
///
/// 教务网对现代浏览器返回不同的页面结构，必须使用旧式 UA 才能拿到
/// 本库解析的表格布局。
pub const UA_IE11: &str = "Mozilla/5.0 (Windows NT 6.1; WOW64; Trident/7.0; rv:11.0) like Gecko";

/// 生产环境教务网地址
pub const DEFAULT_BASE_URL: &str = "http://jxgl.cqu.edu.cn";

/// 每次建立会话时使用的不可变配置
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// 教学管理系统地址，含协议名与域名
    pub base_url: String,
    /// 请求使用的 User-Agent
    pub user_agent: String,
    /// 每个网络请求的超时时间
    pub timeout: Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: UA_IE11.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// 理论课（课表中 13 列的行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    /// 原始课程名，如 "[MATH10124]数学分析（2）"
    pub identifier: String,
    /// 学分
    pub score: f64,
    /// 总学时
    pub time_total: f64,
    /// 讲授学时
    pub time_teach: f64,
    /// 实践学时
    pub time_practice: f64,
    /// 类别（必修/选修等）
    pub classifier: String,
    /// 教学方式
    pub teach_type: String,
    /// 考核方式
    pub exam_type: String,
    /// 教师
    pub teacher: String,
    /// 周次编码，如 "1-16" 或 "1,3,5-9"
    pub week_schedule: String,
    /// 节次编码，如 "一[1-2节]"
    pub day_schedule: String,
    /// 上课地点
    pub location: String,
}

/// 实验课（课表中 12 列的行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentCourse {
    pub identifier: String,
    pub score: f64,
    pub time_total: f64,
    pub time_teach: f64,
    pub time_practice: f64,
    /// 实验项目名称
    pub project_name: String,
    pub teacher: String,
    /// 值班教师
    pub hosting_teacher: String,
    pub week_schedule: String,
    pub day_schedule: String,
    pub location: String,
}

/// 课表中的一行记录，按列数区分两种行结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CourseRecord {
    Theory(Course),
    Experiment(ExperimentCourse),
}

impl CourseRecord {
    pub fn identifier(&self) -> &str {
        match self {
            Self::Theory(c) => &c.identifier,
            Self::Experiment(c) => &c.identifier,
        }
    }

    pub fn teacher(&self) -> &str {
        match self {
            Self::Theory(c) => &c.teacher,
            Self::Experiment(c) => &c.teacher,
        }
    }

    pub fn week_schedule(&self) -> &str {
        match self {
            Self::Theory(c) => &c.week_schedule,
            Self::Experiment(c) => &c.week_schedule,
        }
    }

    pub fn day_schedule(&self) -> &str {
        match self {
            Self::Theory(c) => &c.day_schedule,
            Self::Experiment(c) => &c.day_schedule,
        }
    }

    pub fn location(&self) -> &str {
        match self {
            Self::Theory(c) => &c.location,
            Self::Experiment(c) => &c.location,
        }
    }
}

/// 考试安排
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    /// 原始课程名，如 "[MATH10124]数学分析（2）"
    pub identifier: String,
    /// 学分
    pub score: f64,
    /// 类别
    pub classifier: String,
    /// 考核方式
    pub exam_type: String,
    /// 原始时间串，如 "2021-06-10(16周 星期四)08:30-10:30"
    pub time: String,
    /// 考场
    pub location: String,
    /// 座位号
    pub seat_no: i64,
}

static RE_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([^\]]+)\](.*)$").unwrap());

/// 教务处原始课程名拆出的编号与名称
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseIdentifier {
    pub code: String,
    pub name: String,
}

impl CourseIdentifier {
    /// 解析形如 "[MATH10124]数学分析（2）" 的原始课程名。
    pub fn parse(identifier: &str) -> Result<Self> {
        let caps = RE_IDENTIFIER
            .captures(identifier)
            .ok_or_else(|| Error::MalformedRow(format!("原始课程名格式错误: {identifier}")))?;
        Ok(Self {
            code: caps[1].to_string(),
            name: caps[2].to_string(),
        })
    }
}

/// 老教务网成绩单中的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub course_code: String,
    pub course_name: String,
    pub score: String,
    pub credit: String,
    pub elective: String,
    pub classifier: String,
    pub teacher: String,
    pub exam_kind: String,
    pub note: String,
    pub term: String,
}

/// 老教务网成绩单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub student_id: String,
    pub student_name: String,
    pub major: String,
    pub gpa: String,
    pub query_time: String,
    pub records: Vec<ScoreRecord>,
}
