//! 老教务网的成绩单查询。
//!
//! 新教务网会因未评教拒绝提供成绩单，这里走 oldjw.cqu.edu.cn 的
//! 旧接口。页面是 GBK 编码，密码与新教务网不同（默认为身份证后
//! 六位）。

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};

use crate::{Credentials, Error, PortalConfig, Result, ScoreRecord, ScoreReport};

/// 老教务网地址
pub const DEFAULT_OLD_BASE_URL: &str = "http://oldjw.cqu.edu.cn:8088";

const LOGIN_PATH: &str = "/login.asp";
const SCORES_PATH: &str = "/score/sel_score/sum_score_sel.asp";

const BAD_PASSWORD_MARKER: &str = "你的密码不正确";

static RE_QUERY_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"查询时间：(2\d{3}-\d{1,2}-\d{1,2} \d{1,2}:\d{1,2}:\d{1,2})").unwrap()
});
static RE_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</b>|</?p>|\s").unwrap());
static RE_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s").unwrap());

/// 老教务网客户端。与新教务网同样的登录套路，但没有 cookie 引导，
/// 也不派生摘要，表单里提交明文密码。
pub struct OldPortal {
    client: Client,
    base_url: String,
}

impl OldPortal {
    pub fn new(config: &PortalConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .cookie_store(true)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: DEFAULT_OLD_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 登录并抓取全部成绩。
    pub async fn fetch_scores(&self, credentials: &Credentials) -> Result<ScoreReport> {
        tracing::info!(username = %credentials.username, "logging into old portal");
        // 两个 submit 坐标字段是表单图片按钮的点击位置，服务端要求存在
        let form = [
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
            ("submit1.x", "20"),
            ("submit1.y", "22"),
            ("select1", "#"),
        ];
        let body = self
            .client
            .post(format!("{}{}", self.base_url, LOGIN_PATH))
            .form(&form)
            .send()
            .await
            .map_err(Error::from_transport)?
            .text_with_charset("GBK")
            .await
            .map_err(Error::from_transport)?;
        if body.contains(BAD_PASSWORD_MARKER) {
            return Err(Error::InvalidCredentials);
        }

        let html = self
            .client
            .get(format!("{}{}", self.base_url, SCORES_PATH))
            .send()
            .await
            .map_err(Error::from_transport)?
            .text_with_charset("GBK")
            .await
            .map_err(Error::from_transport)?;
        parse_score_report(&html)
    }
}

/// 解析成绩单页面。
pub fn parse_score_report(html: &str) -> Result<ScoreReport> {
    let document = Html::parse_document(html);

    let header_sel = Selector::parse("td > p:nth-child(2)").expect("valid selector");
    let header_html = document
        .select(&header_sel)
        .next()
        .map(|el| el.inner_html())
        .ok_or_else(|| Error::MalformedRow("成绩单缺少表头".to_string()))?;
    // 表头是 <b> 分隔的 "学号：… 姓名：… 专业：… GPA：…"
    let fields: Vec<String> = header_html
        .split("<b>")
        .map(|chunk| RE_TAGS.replace_all(chunk, "").to_string())
        .filter(|chunk| !chunk.is_empty())
        .collect();
    if fields.len() < 4 {
        return Err(Error::MalformedRow(format!("表头字段不足: {fields:?}")));
    }
    let label_value = |s: &str| -> String {
        s.splitn(2, '：').nth(1).unwrap_or_default().to_string()
    };

    let row_sel = Selector::parse("tr").expect("valid selector");
    let cell_sel = Selector::parse("td").expect("valid selector");
    let rows: Vec<_> = document.select(&row_sel).collect();
    if rows.len() < 4 {
        return Err(Error::MalformedRow("成绩单表格行数不足".to_string()));
    }

    let mut records = Vec::new();
    // 前三行是表头和说明，最后一行是页脚
    for row in &rows[3..rows.len() - 1] {
        let cells: Vec<String> = row
            .select(&cell_sel)
            .map(|td| {
                RE_SPACE
                    .replace_all(&td.text().collect::<String>(), "")
                    .to_string()
            })
            .collect();
        if cells.len() < 11 {
            return Err(Error::MalformedRow(format!(
                "未知的成绩单行结构（{} 列）",
                cells.len()
            )));
        }
        records.push(ScoreRecord {
            course_code: cells[1].clone(),
            course_name: cells[2].clone(),
            score: cells[3].clone(),
            credit: cells[4].clone(),
            elective: cells[5].clone(),
            classifier: cells[6].clone(),
            teacher: cells[7].clone(),
            exam_kind: cells[8].clone(),
            note: cells[9].clone(),
            term: cells[10].clone(),
        });
    }

    let query_time = RE_QUERY_TIME
        .captures(html)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    Ok(ScoreReport {
        student_id: label_value(&fields[0]),
        student_name: label_value(&fields[1]),
        major: label_value(&fields[2]),
        gpa: label_value(&fields[3]),
        query_time,
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCORE_PAGE: &str = r#"
    <table>
      <tr><td><p>重庆大学成绩单</p><p><b>学号：20200001</b><b>姓名：张三</b><b>专业：数学</b><b>GPA：3.52</b></p></td></tr>
      <tr><td>说明</td></tr>
      <tr><td>序号</td><td>课程编码</td><td>课程名称</td></tr>
      <tr>
        <td>1</td><td>MATH10124</td><td>数学分析（2）</td><td>92</td><td>5</td>
        <td>必修</td><td>理论</td><td>张三</td><td>正常考试</td><td></td><td>2020-2021春</td>
      </tr>
      <tr><td>查询时间：2021-07-01 10:00:00</td></tr>
    </table>
    "#;

    #[test]
    fn report_header_and_rows_parse() {
        let report = parse_score_report(SCORE_PAGE).unwrap();
        assert_eq!(report.student_id, "20200001");
        assert_eq!(report.student_name, "张三");
        assert_eq!(report.gpa, "3.52");
        assert_eq!(report.query_time, "2021-07-01 10:00:00");
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].course_code, "MATH10124");
        assert_eq!(report.records[0].term, "2020-2021春");
    }

    #[test]
    fn missing_header_is_malformed() {
        assert!(matches!(
            parse_score_report("<table><tr><td>x</td></tr></table>"),
            Err(Error::MalformedRow(_))
        ));
    }

    #[test]
    fn short_score_row_is_malformed() {
        let page = SCORE_PAGE.replace("<td>2020-2021春</td>", "");
        assert!(matches!(
            parse_score_report(&page),
            Err(Error::MalformedRow(_))
        ));
    }
}
