//! 把课程/考试记录转换为 iCalendar 文档。

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use regex::Regex;
use uuid::Uuid;

use crate::{
    CourseIdentifier, CourseRecord, Error, Exam, Result,
    materialize::{decode_course_slot, decode_exam_time},
    schedule::Schedule,
};

/// 输出文档内嵌的固定时区定义（Asia/Shanghai）。
const VTIMEZONE: &str = concat!(
    "BEGIN:VTIMEZONE\r\n",
    "TZID:Asia/Shanghai\r\n",
    "X-LIC-LOCATION:Asia/Shanghai\r\n",
    "BEGIN:STANDARD\r\n",
    "TZNAME:CST\r\n",
    "TZOFFSETFROM:+0800\r\n",
    "TZOFFSETTO:+0800\r\n",
    "DTSTART:19700101T000000\r\n",
    "END:STANDARD\r\n",
    "END:VTIMEZONE\r\n",
);

const TZID: &str = "Asia/Shanghai";

static RE_WEEK_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(?:-(\d+))?$").unwrap());

/// 一条日历日程。
///
/// `uid` 由起止时刻和来源记录的自然键派生，重建日历得到完全相同的
/// 标识，便于日历软件做增量更新。
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub summary: String,
    pub location: String,
    pub description: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    /// 按周重复的次数，单次日程为 1
    pub count: u32,
    pub uid: Uuid,
}

fn event_uid(start: &DateTime<FixedOffset>, end: &DateTime<FixedOffset>, key: &str) -> Uuid {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&start.timestamp().to_be_bytes());
    bytes[8..].copy_from_slice(&end.timestamp().to_be_bytes());
    Uuid::new_v3(&Uuid::from_bytes(bytes), key.as_bytes())
}

/// ICS 日历生成器
pub struct CalendarBuilder {
    calendar_name: Option<String>,
}

impl CalendarBuilder {
    pub fn new() -> Self {
        Self {
            calendar_name: None,
        }
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            calendar_name: Some(name.into()),
        }
    }

    /// 课程表日程。
    ///
    /// 周次字段按逗号拆成多个周组，每个周组生成一条独立日程：
    /// `a-b` 重复 b-a+1 次，单个周次重复 1 次。
    pub fn course_events(
        &self,
        records: &[CourseRecord],
        term_start: NaiveDate,
        schedule: &Schedule,
    ) -> Result<Vec<CalendarEvent>> {
        let mut events = Vec::new();
        for record in records {
            let id = CourseIdentifier::parse(record.identifier())?;
            let description = match record {
                CourseRecord::Theory(c) => format!(
                    "教师：{}；\n课程编号：{}；\n学分：{}",
                    c.teacher, id.code, c.score
                ),
                CourseRecord::Experiment(c) => format!(
                    "教师：{}；\n值班教师：{}；\n课程编号：{}；\n项目：{}",
                    c.teacher, c.hosting_teacher, id.code, c.project_name
                ),
            };
            let uid_key = format!("{}-{}", record.identifier(), record.teacher());

            for group in record.week_schedule().split(',') {
                let caps = RE_WEEK_GROUP
                    .captures(group.trim())
                    .ok_or_else(|| Error::UnparsableTime(group.to_string()))?;
                let first = caps[1].to_string();
                let count = match caps.get(2) {
                    Some(last) => {
                        let a: u32 = caps[1]
                            .parse()
                            .map_err(|_| Error::UnparsableTime(group.to_string()))?;
                        let b: u32 = last
                            .as_str()
                            .parse()
                            .map_err(|_| Error::UnparsableTime(group.to_string()))?;
                        if b < a {
                            return Err(Error::UnparsableTime(group.to_string()));
                        }
                        b - a + 1
                    }
                    None => 1,
                };

                let (start, end) =
                    decode_course_slot(&first, record.day_schedule(), term_start, schedule)?;
                events.push(CalendarEvent {
                    summary: id.name.clone(),
                    location: record.location().to_string(),
                    description: description.clone(),
                    start,
                    end,
                    count,
                    uid: event_uid(&start, &end, &uid_key),
                });
            }
        }
        Ok(events)
    }

    /// 考试安排日程，每场考试一条，不重复。
    pub fn exam_events(&self, exams: &[Exam]) -> Result<Vec<CalendarEvent>> {
        exams
            .iter()
            .map(|exam| {
                let id = CourseIdentifier::parse(&exam.identifier)?;
                let (start, end) = decode_exam_time(&exam.time)?;
                let mut description = format!("考试：\n学分：{}；\n课程编号：{}", exam.score, id.code);
                if !exam.classifier.is_empty() {
                    description.push_str(&format!("；\n类别：{}", exam.classifier));
                }
                if !exam.exam_type.is_empty() {
                    description.push_str(&format!("；\n考核方式：{}", exam.exam_type));
                }
                let uid_key = format!("{}-考试-{}", exam.identifier, exam.classifier);
                Ok(CalendarEvent {
                    summary: format!("考试：{}", id.name),
                    location: format!("{}-座位号{}", exam.location, exam.seat_no),
                    description,
                    start,
                    end,
                    count: 1,
                    uid: event_uid(&start, &end, &uid_key),
                })
            })
            .collect()
    }

    /// 渲染 iCalendar 文档。
    pub fn to_ics(&self, events: &[CalendarEvent]) -> String {
        let mut ics = String::new();
        ics.push_str("BEGIN:VCALENDAR\r\n");
        ics.push_str("VERSION:2.0\r\n");
        ics.push_str("PRODID:-//CQU ICS//CQU Course Calendar//CN\r\n");
        ics.push_str("CALSCALE:GREGORIAN\r\n");
        if let Some(ref name) = self.calendar_name {
            ics.push_str(&format!("X-WR-CALNAME:{}\r\n", escape_text(name)));
        }
        ics.push_str(&format!("X-WR-TIMEZONE:{TZID}\r\n"));
        ics.push_str(VTIMEZONE);

        let dtstamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        for event in events {
            ics.push_str("BEGIN:VEVENT\r\n");
            ics.push_str(&format!("UID:{}\r\n", event.uid));
            ics.push_str(&format!("DTSTAMP:{dtstamp}\r\n"));
            ics.push_str(&format!(
                "DTSTART;TZID={TZID}:{}\r\n",
                event.start.format("%Y%m%dT%H%M%S")
            ));
            ics.push_str(&format!(
                "DTEND;TZID={TZID}:{}\r\n",
                event.end.format("%Y%m%dT%H%M%S")
            ));
            ics.push_str(&format!("SUMMARY:{}\r\n", escape_text(&event.summary)));
            if !event.location.is_empty() {
                ics.push_str(&format!("LOCATION:{}\r\n", escape_text(&event.location)));
            }
            ics.push_str(&format!(
                "DESCRIPTION:{}\r\n",
                escape_text(&event.description)
            ));
            ics.push_str(&format!("RRULE:FREQ=WEEKLY;COUNT={}\r\n", event.count));
            ics.push_str("END:VEVENT\r\n");
        }

        ics.push_str("END:VCALENDAR\r\n");
        ics
    }
}

impl Default for CalendarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 转义 ICS 文本内容
fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace(',', "\\,")
        .replace(';', "\\;")
}
