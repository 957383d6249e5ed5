#![forbid(unsafe_code)]

//! Dense display-ID allocation.
//!
//! UUIDs are the storage key; the small integers shown to the user are
//! recomputed on every load so that they always occupy `1..=N` for the `N`
//! ID-bearing tasks. Previously shown IDs are kept as hints and reused when
//! they still fit in the range.

use std::collections::{BTreeMap, BTreeSet};

use uuid::Uuid;

use crate::task::model::Task;
use crate::task::status::Status;

/// Previous display IDs keyed by UUID.
pub type IdMap = BTreeMap<Uuid, u32>;

/// Assigns `task.id` for every task and returns the resulting UUID -> ID map
/// (only ID-bearing tasks appear in it).
pub fn allocate(tasks: &mut [Task], id_statuses: &[Status], hints: &IdMap) -> IdMap {
    let mut bearing: Vec<usize> = Vec::new();
    for (i, task) in tasks.iter_mut().enumerate() {
        if task.bears_id(id_statuses) {
            bearing.push(i);
        } else {
            task.id = 0;
        }
    }
    bearing.sort_by_key(|&i| tasks[i].uuid);

    let n = u32::try_from(bearing.len()).unwrap_or(u32::MAX);
    let mut taken: BTreeSet<u32> = BTreeSet::new();
    let mut unassigned: Vec<usize> = Vec::new();

    for &i in &bearing {
        let task = &mut tasks[i];
        match hints.get(&task.uuid) {
            Some(&prev) if (1..=n).contains(&prev) && taken.insert(prev) => task.id = prev,
            _ => unassigned.push(i),
        }
    }

    unassigned.sort_by(|&a, &b| {
        tasks[a]
            .created
            .cmp(&tasks[b].created)
            .then_with(|| tasks[a].uuid.cmp(&tasks[b].uuid))
    });

    let mut next = 1;
    for i in unassigned {
        while taken.contains(&next) {
            next += 1;
        }
        tasks[i].id = next;
        taken.insert(next);
    }

    bearing
        .into_iter()
        .map(|i| (tasks[i].uuid, tasks[i].id))
        .collect()
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::task::status::NON_RESOLVED;

    fn task_at(summary: &str, secs: i64) -> Task {
        let mut t = Task::new(summary);
        t.created = OffsetDateTime::from_unix_timestamp(1_700_000_000 + secs).unwrap();
        t
    }

    fn sorted_ids(tasks: &[Task]) -> Vec<u32> {
        let mut ids: Vec<u32> = tasks.iter().filter(|t| t.id != 0).map(|t| t.id).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn ids_are_dense_for_every_size() {
        for n in 0..20u32 {
            let mut tasks: Vec<Task> = (0..n).map(|i| task_at("t", i64::from(i))).collect();
            let map = allocate(&mut tasks, NON_RESOLVED, &IdMap::new());
            assert_eq!(sorted_ids(&tasks), (1..=n).collect::<Vec<_>>());
            assert_eq!(map.len(), n as usize);
        }
    }

    #[test]
    fn fresh_tasks_are_numbered_by_creation_time() {
        let mut tasks = vec![task_at("c", 30), task_at("a", 10), task_at("b", 20)];
        allocate(&mut tasks, NON_RESOLVED, &IdMap::new());
        let by_summary: BTreeMap<&str, u32> =
            tasks.iter().map(|t| (t.summary.as_str(), t.id)).collect();
        assert_eq!(by_summary["a"], 1);
        assert_eq!(by_summary["b"], 2);
        assert_eq!(by_summary["c"], 3);
    }

    #[test]
    fn rerunning_with_own_output_is_stable() {
        let mut tasks: Vec<Task> = (0..8).map(|i| task_at("t", i)).collect();
        let first = allocate(&mut tasks, NON_RESOLVED, &IdMap::new());
        tasks.reverse();
        let second = allocate(&mut tasks, NON_RESOLVED, &first);
        assert_eq!(first, second);
    }

    #[test]
    fn previous_ids_are_kept_when_in_range() {
        let mut tasks = vec![task_at("a", 0), task_at("b", 1), task_at("c", 2)];
        let mut hints = IdMap::new();
        hints.insert(tasks[0].uuid, 3);
        hints.insert(tasks[1].uuid, 1);
        allocate(&mut tasks, NON_RESOLVED, &hints);
        assert_eq!(tasks[0].id, 3);
        assert_eq!(tasks[1].id, 1);
        assert_eq!(tasks[2].id, 2);
    }

    #[test]
    fn out_of_range_ids_compact_to_lowest_free() {
        let mut tasks = vec![task_at("a", 0), task_at("b", 1)];
        let mut hints = IdMap::new();
        hints.insert(tasks[0].uuid, 7);
        hints.insert(tasks[1].uuid, 2);
        allocate(&mut tasks, NON_RESOLVED, &hints);
        assert_eq!(tasks[0].id, 1);
        assert_eq!(tasks[1].id, 2);
    }

    #[test]
    fn colliding_hints_do_not_duplicate() {
        // Two devices handed out the same ID before a merge.
        let mut tasks = vec![task_at("a", 0), task_at("b", 1)];
        let mut hints = IdMap::new();
        hints.insert(tasks[0].uuid, 1);
        hints.insert(tasks[1].uuid, 1);
        allocate(&mut tasks, NON_RESOLVED, &hints);
        assert_eq!(sorted_ids(&tasks), vec![1, 2]);
    }

    #[test]
    fn resolved_tasks_get_no_id() {
        let mut tasks = vec![task_at("a", 0), task_at("b", 1)];
        tasks[0].status = Status::Resolved;
        tasks[0].id = 5;
        let map = allocate(&mut tasks, NON_RESOLVED, &IdMap::new());
        assert_eq!(tasks[0].id, 0);
        assert_eq!(tasks[1].id, 1);
        assert!(!map.contains_key(&tasks[0].uuid));
    }
}
