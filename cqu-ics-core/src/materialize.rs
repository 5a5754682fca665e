//! 将课表/考试的压缩时间编码具体化为带时区的绝对时刻。

use std::sync::LazyLock;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use regex::Regex;

use crate::{
    Error, Result,
    schedule::{FULL_DAY, Schedule},
};

/// 教务网使用的固定时区（Asia/Shanghai, UTC+8）。
pub fn timezone() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap()
}

static RE_EXAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})\(\d+周 星期[一二三四五六日]\)(\d{2}:\d{2})-(\d{2}:\d{2})$")
        .unwrap()
});

static RE_DAY_LESSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([一二三四五六日])\[([\d\-]+)节\]$").unwrap());

static RE_LESSON_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(?:-(\d+))?$").unwrap());

/// 星期字符到偏移量的映射，星期一为一周的起始。
fn weekday_offset(day: &str) -> Option<i64> {
    match day {
        "一" => Some(0),
        "二" => Some(1),
        "三" => Some(2),
        "四" => Some(3),
        "五" => Some(4),
        "六" => Some(5),
        "日" => Some(6),
        _ => None,
    }
}

/// 解析考试时间串，如 `2021-06-10(16周 星期四)08:30-10:30`。
///
/// 括号内的周次与星期只是提示信息，不参与计算。
pub fn decode_exam_time(raw: &str) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
    let caps = RE_EXAM
        .captures(raw)
        .ok_or_else(|| Error::UnparsableTime(raw.to_string()))?;
    let date = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d")
        .map_err(|_| Error::UnparsableTime(raw.to_string()))?;
    let begin = NaiveTime::parse_from_str(&caps[2], "%H:%M")
        .map_err(|_| Error::UnparsableTime(raw.to_string()))?;
    let end = NaiveTime::parse_from_str(&caps[3], "%H:%M")
        .map_err(|_| Error::UnparsableTime(raw.to_string()))?;

    Ok((at_local(date.and_time(begin))?, at_local(date.and_time(end))?))
}

/// 将 周次+节次 编码具体化为第一次上课的起止时刻。
///
/// `week_token` 是单个周次（如 `"3"`），`day_lesson` 形如 `一[1-2节]`。
/// 节次部分可以是单节、`a-b` 区间，或表示全天的 `13`/`14`。
pub fn decode_course_slot(
    week_token: &str,
    day_lesson: &str,
    term_start: NaiveDate,
    schedule: &Schedule,
) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
    let week: i64 = week_token
        .parse()
        .map_err(|_| Error::UnparsableTime(week_token.to_string()))?;
    let caps = RE_DAY_LESSON
        .captures(day_lesson)
        .ok_or_else(|| Error::UnparsableTime(day_lesson.to_string()))?;
    let day = weekday_offset(&caps[1]).ok_or_else(|| Error::UnparsableTime(day_lesson.to_string()))?;
    let lesson = &caps[2];

    let range = RE_LESSON_RANGE
        .captures(lesson)
        .ok_or_else(|| Error::UnparsableTime(day_lesson.to_string()))?;
    let first: u32 = range[1]
        .parse()
        .map_err(|_| Error::UnparsableTime(day_lesson.to_string()))?;

    let (begin, end) = match range.get(2) {
        Some(last) => {
            let last: u32 = last
                .as_str()
                .parse()
                .map_err(|_| Error::UnparsableTime(day_lesson.to_string()))?;
            let (begin, _) = schedule
                .period(first)
                .ok_or_else(|| Error::UnparsableTime(day_lesson.to_string()))?;
            let (_, end) = schedule
                .period(last)
                .ok_or_else(|| Error::UnparsableTime(day_lesson.to_string()))?;
            (begin, end)
        }
        // 13节、14节 都表示占用全天
        None if first == FULL_DAY || first == FULL_DAY - 1 => schedule.full_day(),
        None => schedule
            .period(first)
            .ok_or_else(|| Error::UnparsableTime(day_lesson.to_string()))?,
    };

    let days = Duration::days((week - 1) * 7 + day);
    let midnight = at_local(term_start.and_time(NaiveTime::MIN))?;
    Ok((midnight + days + begin, midnight + days + end))
}

fn at_local(naive: chrono::NaiveDateTime) -> Result<DateTime<FixedOffset>> {
    timezone()
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| Error::UnparsableTime(naive.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn exam_time_uses_only_date_and_clock() {
        let (begin, end) = decode_exam_time("2021-06-10(16周 星期四)08:30-10:30").unwrap();
        assert_eq!(begin, timezone().with_ymd_and_hms(2021, 6, 10, 8, 30, 0).unwrap());
        assert_eq!(end, timezone().with_ymd_and_hms(2021, 6, 10, 10, 30, 0).unwrap());
    }

    #[test]
    fn exam_time_rejects_missing_parenthetical() {
        assert!(matches!(
            decode_exam_time("2021-06-10 08:30-10:30"),
            Err(Error::UnparsableTime(_))
        ));
    }

    #[test]
    fn first_week_monday_offsets_from_term_start() {
        let schedule = Schedule::new_2020();
        let (begin, end) =
            decode_course_slot("1", "一[1-2节]", date(2020, 8, 31), &schedule).unwrap();
        assert_eq!(begin, timezone().with_ymd_and_hms(2020, 8, 31, 8, 30, 0).unwrap());
        assert_eq!(end, timezone().with_ymd_and_hms(2020, 8, 31, 10, 10, 0).unwrap());
    }

    #[test]
    fn later_week_and_weekday_advance_whole_days() {
        let schedule = Schedule::new_2020();
        // 第 3 周星期三 = 14 + 2 天之后
        let (begin, _) =
            decode_course_slot("3", "三[5节]", date(2020, 8, 31), &schedule).unwrap();
        assert_eq!(begin, timezone().with_ymd_and_hms(2020, 9, 16, 13, 30, 0).unwrap());
    }

    #[test]
    fn lesson_fourteen_occupies_the_whole_day() {
        let schedule = Schedule::new_2020();
        for token in ["一[14节]", "一[13节]"] {
            let (begin, end) =
                decode_course_slot("1", token, date(2020, 8, 31), &schedule).unwrap();
            assert_eq!(begin, timezone().with_ymd_and_hms(2020, 8, 31, 8, 30, 0).unwrap());
            assert_eq!(end, timezone().with_ymd_and_hms(2020, 8, 31, 23, 59, 0).unwrap());
        }
    }

    #[test]
    fn sunday_maps_to_offset_six() {
        let schedule = Schedule::new_2020();
        let (begin, _) =
            decode_course_slot("1", "日[1节]", date(2020, 8, 31), &schedule).unwrap();
        assert_eq!(begin, timezone().with_ymd_and_hms(2020, 9, 6, 8, 30, 0).unwrap());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let schedule = Schedule::new_2020();
        for token in ["一[1-2]", "八[1-2节]", "一[x节]", "[1-2节]"] {
            assert!(matches!(
                decode_course_slot("1", token, date(2020, 8, 31), &schedule),
                Err(Error::UnparsableTime(_))
            ));
        }
        assert!(matches!(
            decode_course_slot("x", "一[1-2节]", date(2020, 8, 31), &schedule),
            Err(Error::UnparsableTime(_))
        ));
    }
}
