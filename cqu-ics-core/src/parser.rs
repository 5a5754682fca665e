//! 教务网服务端渲染 HTML 的解析。
//!
//! 只面向 jxgl.cqu.edu.cn 固定的表格布局，不做通用抓取；任何与预期
//! 不符的行结构都立刻报错，以便及时发现教务网改版。

use std::collections::BTreeMap;

use scraper::{ElementRef, Html, Selector};

use crate::{Course, CourseRecord, Error, Exam, ExperimentCourse, Result};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("selector literal is valid CSS")
}

/// 读取单元格生效值：可见文本，为空时退回 `hidevalue` 属性。
///
/// 教务网的部分单元格渲染为空白，真实值藏在属性里。
fn cell_value(cell: ElementRef<'_>) -> String {
    let text: String = cell.text().collect::<String>().trim().to_string();
    if !text.is_empty() {
        return text;
    }
    cell.value()
        .attr("hidevalue")
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

fn cell_f64(cells: &[ElementRef<'_>], index: usize) -> Result<f64> {
    let raw = cell_value(cells[index]);
    raw.parse()
        .map_err(|_| Error::MalformedRow(format!("第 {index} 列不是数字: {raw:?}")))
}

fn cell_i64(cells: &[ElementRef<'_>], index: usize) -> Result<i64> {
    let raw = cell_value(cells[index]);
    raw.parse()
        .map_err(|_| Error::MalformedRow(format!("第 {index} 列不是整数: {raw:?}")))
}

/// 解析课程表 HTML，每行对应一条记录。
///
/// 13 列（首列序号忽略）是理论课，12 列是实验课；其余列数视为
/// 教务网改版，直接报错而不是悄悄丢弃。
pub fn parse_courses(html: &str) -> Result<Vec<CourseRecord>> {
    let document = Html::parse_document(html);
    let row_sel = selector("table tbody tr");
    let cell_sel = selector("td");

    let mut records = Vec::new();
    for row in document.select(&row_sel) {
        let cells: Vec<ElementRef<'_>> = row.select(&cell_sel).collect();
        records.push(make_course(&cells)?);
    }
    Ok(records)
}

fn make_course(cells: &[ElementRef<'_>]) -> Result<CourseRecord> {
    match cells.len() {
        13 => Ok(CourseRecord::Theory(Course {
            identifier: cell_value(cells[1]),
            score: cell_f64(cells, 2)?,
            time_total: cell_f64(cells, 3)?,
            time_teach: cell_f64(cells, 4)?,
            time_practice: cell_f64(cells, 5)?,
            classifier: cell_value(cells[6]),
            teach_type: cell_value(cells[7]),
            exam_type: cell_value(cells[8]),
            teacher: cell_value(cells[9]),
            week_schedule: cell_value(cells[10]),
            day_schedule: cell_value(cells[11]),
            location: cell_value(cells[12]),
        })),
        12 => Ok(CourseRecord::Experiment(ExperimentCourse {
            identifier: cell_value(cells[1]),
            score: cell_f64(cells, 2)?,
            time_total: cell_f64(cells, 3)?,
            time_teach: cell_f64(cells, 4)?,
            time_practice: cell_f64(cells, 5)?,
            project_name: cell_value(cells[6]),
            teacher: cell_value(cells[7]),
            hosting_teacher: cell_value(cells[8]),
            week_schedule: cell_value(cells[9]),
            day_schedule: cell_value(cells[10]),
            location: cell_value(cells[11]),
        })),
        n => Err(Error::MalformedRow(format!("未知的课表行结构（{n} 列）"))),
    }
}

/// 解析考试安排 HTML。行结构固定为 8 列（首列序号忽略）。
pub fn parse_exams(html: &str) -> Result<Vec<Exam>> {
    let document = Html::parse_document(html);
    let row_sel = selector("table#ID_Table tr");
    let cell_sel = selector("td");

    let mut exams = Vec::new();
    for row in document.select(&row_sel) {
        let cells: Vec<ElementRef<'_>> = row.select(&cell_sel).collect();
        if cells.len() != 8 {
            return Err(Error::MalformedRow(format!(
                "未知的考试安排行结构（{} 列）",
                cells.len()
            )));
        }
        exams.push(Exam {
            identifier: cell_value(cells[1]),
            score: cell_f64(&cells, 2)?,
            classifier: cell_value(cells[3]),
            exam_type: cell_value(cells[4]),
            time: cell_value(cells[5]),
            location: cell_value(cells[6]),
            seat_no: cell_i64(&cells, 7)?,
        });
    }
    Ok(exams)
}

/// 解析学期下拉框，返回 {学期编号: 学期名称}。
///
/// 课表页的控件名为 `Sel_XNXQ`，考试安排页为 `sel_xnxq`。
pub fn parse_terms(html: &str, select_name: &str) -> Result<BTreeMap<i32, String>> {
    let document = Html::parse_document(html);
    let option_sel = selector(&format!("select[name=\"{select_name}\"] > option"));

    let mut terms = BTreeMap::new();
    for option in document.select(&option_sel) {
        let value = option.value().attr("value").unwrap_or_default();
        let id: i32 = value
            .parse()
            .map_err(|_| Error::MalformedRow(format!("学期编号不是整数: {value:?}")))?;
        terms.insert(id, option.text().collect::<String>().trim().to_string());
    }
    Ok(terms)
}
