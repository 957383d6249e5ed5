#![forbid(unsafe_code)]

use std::cmp::Ordering;

use crate::task::model::Task;

/// Display order: most urgent priority first, then oldest, then lowest ID.
#[must_use]
pub fn display_order(a: &Task, b: &Task) -> Ordering {
    b.priority
        .rank()
        .cmp(&a.priority.rank())
        .then_with(|| a.created.cmp(&b.created))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::task::model::Priority;

    fn task(summary: &str, priority: Priority, secs: i64, id: u32) -> Task {
        let mut t = Task::new(summary);
        t.priority = priority;
        t.created = OffsetDateTime::from_unix_timestamp(1_700_000_000 + secs).unwrap();
        t.id = id;
        t
    }

    #[test]
    fn orders_by_priority_then_age_then_id() {
        let mut tasks = vec![
            task("low", Priority::Low, 0, 1),
            task("normal-new", Priority::Normal, 50, 2),
            task("normal-old", Priority::Normal, 10, 3),
            task("critical", Priority::Critical, 99, 4),
            task("normal-old-tie", Priority::Normal, 10, 5),
            task("high", Priority::High, 0, 6),
        ];
        tasks.sort_by(display_order);
        let order: Vec<&str> = tasks.iter().map(|t| t.summary.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "critical",
                "high",
                "normal-old",
                "normal-old-tie",
                "normal-new",
                "low"
            ]
        );
    }
}
