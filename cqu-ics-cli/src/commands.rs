use std::fs;

use anyhow::Result;
use chrono::NaiveDate;
use cqu_ics_core::{
    Credentials, PortalConfig,
    ics::CalendarBuilder,
    schedule::Schedule,
    scores::OldPortal,
    session::Session,
};

/// 导出课程表命令的参数
pub struct CoursesParams {
    pub username: String,
    pub password: String,
    pub start_date: String,
    pub term: Option<i32>,
    pub output: Option<String>,
    pub calendar_name: Option<String>,
    pub base_url: Option<String>,
}

/// 导出考试安排命令的参数
pub struct ExamsParams {
    pub username: String,
    pub password: String,
    pub term: Option<i32>,
    pub output: Option<String>,
    pub base_url: Option<String>,
}

fn portal_config(base_url: Option<String>) -> PortalConfig {
    let mut config = PortalConfig::default();
    if let Some(base_url) = base_url {
        config.base_url = base_url;
    }
    config
}

async fn open_session(username: &str, password: &str, base_url: Option<String>) -> Result<Session> {
    let credentials = Credentials::new(username, password);
    println!("登录教务网...");
    let session = Session::open(&credentials, portal_config(base_url)).await?;
    println!("✓ 登录成功");
    Ok(session)
}

/// 导出课程表命令
pub async fn courses_command(params: CoursesParams) -> Result<()> {
    let term_start = NaiveDate::parse_from_str(&params.start_date, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("学期第一天格式应为 YYYY-MM-DD: {e}"))?;

    let session = open_session(&params.username, &params.password, params.base_url).await?;

    let term = match params.term {
        Some(term) => term,
        None => latest_term(session.course_terms().await?)?,
    };
    tracing::info!(term, "fetching course table");

    let courses = session.courses(term).await?;
    println!("✓ 成功获取 {} 门课程", courses.len());

    let builder = CalendarBuilder::with_name(
        params
            .calendar_name
            .unwrap_or_else(|| format!("{}的课程表", params.username)),
    );
    let events = builder.course_events(&courses, term_start, &Schedule::new_2020())?;
    let ics_content = builder.to_ics(&events);

    let output_file = params
        .output
        .unwrap_or_else(|| format!("cqu-courses-{}-{}.ics", params.username, term));
    fs::write(&output_file, ics_content)?;
    println!("✓ ICS文件已保存到: {output_file}");

    Ok(())
}

/// 导出考试安排命令
pub async fn exams_command(params: ExamsParams) -> Result<()> {
    let session = open_session(&params.username, &params.password, params.base_url).await?;

    let term = match params.term {
        Some(term) => term,
        None => latest_term(session.exam_terms().await?)?,
    };
    tracing::info!(term, "fetching exam table");

    let exams = session.exams(term).await?;
    println!("✓ 成功获取 {} 场考试", exams.len());

    let builder = CalendarBuilder::with_name(format!("{}的考试安排", params.username));
    let events = builder.exam_events(&exams)?;
    let ics_content = builder.to_ics(&events);

    let output_file = params
        .output
        .unwrap_or_else(|| format!("cqu-exams-{}-{}.ics", params.username, term));
    fs::write(&output_file, ics_content)?;
    println!("✓ ICS文件已保存到: {output_file}");

    Ok(())
}

/// 列出学期命令
pub async fn terms_command(
    username: String,
    password: String,
    base_url: Option<String>,
) -> Result<()> {
    let session = open_session(&username, &password, base_url).await?;

    println!("课程表学期:");
    for (id, label) in session.course_terms().await? {
        println!("  {id} - {label}");
    }
    println!("考试安排学期:");
    for (id, label) in session.exam_terms().await? {
        println!("  {id} - {label}");
    }

    Ok(())
}

/// 成绩单命令
pub async fn scores_command(username: String, password: String) -> Result<()> {
    let credentials = Credentials::new(username, password);
    let portal = OldPortal::new(&PortalConfig::default())?;

    println!("登录老教务网...");
    let report = portal.fetch_scores(&credentials).await?;
    println!(
        "{}（{}，{}）GPA: {}，查询时间: {}",
        report.student_name, report.student_id, report.major, report.gpa, report.query_time
    );
    for record in &report.records {
        println!(
            "  {} {} 成绩:{} 学分:{} {} {}",
            record.course_code, record.course_name, record.score, record.credit, record.exam_kind,
            record.term
        );
    }

    Ok(())
}

/// 验证凭据命令
pub async fn validate_command(
    username: String,
    password: String,
    base_url: Option<String>,
) -> Result<()> {
    let session = open_session(&username, &password, base_url).await?;
    if session.is_authenticated().await? {
        println!("✓ 会话有效");
    } else {
        println!("会话已过期");
    }
    Ok(())
}

fn latest_term(terms: std::collections::BTreeMap<i32, String>) -> Result<i32> {
    terms
        .keys()
        .next_back()
        .copied()
        .ok_or_else(|| anyhow::anyhow!("教务网没有返回任何学期"))
}
