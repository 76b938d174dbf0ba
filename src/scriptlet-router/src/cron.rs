use crate::error::RouterError;

/// A parsed standard 5-field cron expression: minute, hour, day-of-month, month,
/// day-of-week. 6-field expressions (seconds-first or year-suffixed) are rejected at
/// parse time rather than silently misinterpreted.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    minute: FieldSet,
    hour: FieldSet,
    day_of_month: FieldSet,
    month: FieldSet,
    day_of_week: FieldSet,
}

#[derive(Debug, Clone)]
struct FieldSet(Vec<u32>);

impl FieldSet {
    fn contains(&self, value: u32) -> bool {
        self.0.contains(&value)
    }
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, RouterError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = <[&str; 5]>::try_from(fields.as_slice())
            .map_err(|_| RouterError::InvalidCron(expr.to_string(), "expected exactly 5 fields".to_string()))?;
        Ok(Self {
            minute: parse_field(minute, 0, 59, expr)?,
            hour: parse_field(hour, 0, 23, expr)?,
            day_of_month: parse_field(dom, 1, 31, expr)?,
            month: parse_field(month, 1, 12, expr)?,
            day_of_week: parse_field(dow, 0, 6, expr)?,
        })
    }

    /// `minute`/`hour` in local wall-clock terms; `day_of_month`/`month` 1-based;
    /// `day_of_week` 0 = Sunday. Standard cron semantics: when both day-of-month and
    /// day-of-week are restricted (not `*`), the tick is due if either matches.
    #[must_use]
    pub fn is_due(&self, minute: u32, hour: u32, day_of_month: u32, month: u32, day_of_week: u32) -> bool {
        if !self.minute.contains(minute) || !self.hour.contains(hour) || !self.month.contains(month) {
            return false;
        }
        let dom_restricted = self.day_of_month.0.len() < 31;
        let dow_restricted = self.day_of_week.0.len() < 7;
        match (dom_restricted, dow_restricted) {
            (false, false) => true,
            (true, false) => self.day_of_month.contains(day_of_month),
            (false, true) => self.day_of_week.contains(day_of_week),
            (true, true) => self.day_of_month.contains(day_of_month) || self.day_of_week.contains(day_of_week),
        }
    }
}

fn parse_field(raw: &str, min: u32, max: u32, expr: &str) -> Result<FieldSet, RouterError> {
    if raw == "*" {
        return Ok(FieldSet((min..=max).collect()));
    }
    let mut values = Vec::new();
    for part in raw.split(',') {
        let (range_part, step) = match part.split_once('/') {
            Some((range_part, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| RouterError::InvalidCron(expr.to_string(), format!("bad step `{step}`")))?;
                (range_part, step)
            }
            None => (part, 1),
        };
        let (lo, hi) = if range_part == "*" {
            (min, max)
        } else if let Some((lo, hi)) = range_part.split_once('-') {
            (
                lo.parse()
                    .map_err(|_| RouterError::InvalidCron(expr.to_string(), format!("bad range `{part}`")))?,
                hi.parse()
                    .map_err(|_| RouterError::InvalidCron(expr.to_string(), format!("bad range `{part}`")))?,
            )
        } else {
            let value: u32 =
                range_part.parse().map_err(|_| RouterError::InvalidCron(expr.to_string(), format!("bad value `{part}`")))?;
            (value, value)
        };
        if lo < min || hi > max || lo > hi {
            return Err(RouterError::InvalidCron(expr.to_string(), format!("`{part}` out of range {min}-{max}")));
        }
        let mut v = lo;
        while v <= hi {
            values.push(v);
            v += step;
        }
    }
    values.sort_unstable();
    values.dedup();
    Ok(FieldSet(values))
}

#[cfg(test)]
mod tests {
    use super::CronSchedule;

    #[test]
    fn wildcard_matches_every_tick() {
        let schedule = CronSchedule::parse("* * * * *").unwrap();
        assert!(schedule.is_due(0, 0, 1, 1, 0));
        assert!(schedule.is_due(59, 23, 31, 12, 6));
    }

    #[test]
    fn six_field_expressions_are_rejected() {
        assert!(CronSchedule::parse("0 0 * * * *").is_err());
    }

    #[test]
    fn step_values_are_honored() {
        let schedule = CronSchedule::parse("*/15 * * * *").unwrap();
        assert!(schedule.is_due(0, 0, 1, 1, 0));
        assert!(schedule.is_due(45, 0, 1, 1, 0));
        assert!(!schedule.is_due(20, 0, 1, 1, 0));
    }

    #[test]
    fn day_of_month_or_day_of_week_matches_when_both_restricted() {
        let schedule = CronSchedule::parse("0 9 1 * 1").unwrap();
        assert!(schedule.is_due(0, 9, 1, 6, 3));
        assert!(schedule.is_due(0, 9, 15, 6, 1));
        assert!(!schedule.is_due(0, 9, 15, 6, 3));
    }

    #[test]
    fn out_of_range_value_is_rejected() {
        assert!(CronSchedule::parse("60 * * * *").is_err());
    }
}
