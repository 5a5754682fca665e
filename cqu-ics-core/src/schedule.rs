use chrono::Duration;

/// 表示全天的保留节次编号。课表中 "13节"、"14节" 都指占用一整天。
pub const FULL_DAY: u32 = 14;

/// 作息时间表：节次编号到当天零点偏移区间的映射。
///
/// 节次编号从 1 开始；[`FULL_DAY`] 是保留条目，对应"占用全天"的特殊编码。
#[derive(Debug, Clone)]
pub struct Schedule {
    periods: Vec<(u32, Duration, Duration)>,
}

impl Schedule {
    /// 2020~2021 学年开始使用的作息时间表。
    pub fn new_2020() -> Self {
        let hm = |h: i64, m: i64| Duration::minutes(h * 60 + m);
        Self {
            periods: vec![
                (1, hm(8, 30), hm(9, 15)),
                (2, hm(9, 25), hm(10, 10)),
                (3, hm(10, 30), hm(11, 15)),
                (4, hm(11, 25), hm(12, 10)),
                (5, hm(13, 30), hm(14, 15)),
                (6, hm(14, 25), hm(15, 10)),
                (7, hm(15, 30), hm(16, 15)),
                (8, hm(16, 25), hm(17, 10)),
                (9, hm(19, 0), hm(19, 45)),
                (10, hm(19, 55), hm(20, 40)),
                (11, hm(21, 0), hm(21, 45)),
                (12, hm(21, 55), hm(22, 40)),
                (FULL_DAY, hm(8, 30), hm(23, 59)),
            ],
        }
    }

    /// 查询某节次的 (开始, 结束) 偏移。
    pub fn period(&self, index: u32) -> Option<(Duration, Duration)> {
        self.periods
            .iter()
            .find(|(i, _, _)| *i == index)
            .map(|(_, start, end)| (*start, *end))
    }

    /// 保留的全天区间。
    pub fn full_day(&self) -> (Duration, Duration) {
        self.period(FULL_DAY)
            .expect("schedule table is built with a full-day entry")
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new_2020()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_period_starts_at_eight_thirty() {
        let schedule = Schedule::new_2020();
        let (start, end) = schedule.period(1).unwrap();
        assert_eq!(start, Duration::minutes(8 * 60 + 30));
        assert_eq!(end, Duration::minutes(9 * 60 + 15));
    }

    #[test]
    fn full_day_entry_spans_until_midnight() {
        let schedule = Schedule::new_2020();
        let (start, end) = schedule.full_day();
        assert_eq!(start, Duration::minutes(8 * 60 + 30));
        assert_eq!(end, Duration::minutes(23 * 60 + 59));
    }

    #[test]
    fn unknown_period_is_none() {
        assert!(Schedule::new_2020().period(99).is_none());
    }
}
