//! Collapses duplicate instances that represent the same
//! `(workspace, date, pattern)` slot down to a single winner.

use crate::model::ShiftInstance;
use std::collections::HashMap;

const MANUAL_OVERRIDE_WEIGHT: u32 = 100;
const DRIVER_WEIGHT: u32 = 20;
const NOTES_WEIGHT: u32 = 1;

pub fn confirmation_status_rank(status: Option<&str>) -> u32 {
    match status.unwrap_or_default().trim().to_lowercase().as_str() {
        "accepted" => 4,
        "pending" => 3,
        "rejected" => 2,
        "unassigned" => 1,
        _ => 0,
    }
}

pub fn duplicate_score(instance: &ShiftInstance) -> u32 {
    let mut score = 0;
    if instance.manual_override == Some(true) {
        score += MANUAL_OVERRIDE_WEIGHT;
    }
    if instance.driver_id.is_some() {
        score += DRIVER_WEIGHT;
    }
    score += confirmation_status_rank(instance.confirmation_status.as_deref());
    if instance
        .notes
        .as_deref()
        .map(|notes| !notes.trim().is_empty())
        .unwrap_or(false)
    {
        score += NOTES_WEIGHT;
    }
    score
}

fn numeric_id(instance: &ShiftInstance) -> f64 {
    instance
        .id
        .as_str()
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(f64::INFINITY)
}

/// Higher score wins; on a tie the smaller numeric id (the older record) is kept.
pub fn pick_better_duplicate<'a>(
    left: &'a ShiftInstance,
    right: &'a ShiftInstance,
) -> &'a ShiftInstance {
    let left_score = duplicate_score(left);
    let right_score = duplicate_score(right);
    if right_score > left_score {
        return right;
    }
    if left_score > right_score {
        return left;
    }

    if numeric_id(right) < numeric_id(left) {
        right
    } else {
        left
    }
}

fn dedup_key(instance: &ShiftInstance) -> Option<(String, String, String)> {
    let pattern = instance.pattern_id.as_ref()?;
    if instance.workspace_id.as_str().is_empty() || pattern.as_str().is_empty() {
        return None;
    }
    Some((
        instance.workspace_id.as_str().to_owned(),
        instance.date.to_string(),
        pattern.as_str().to_owned(),
    ))
}

/// Group winners in first-seen order, followed by rows that lack part of the
/// key and therefore pass through untouched.
pub fn dedupe_instances(instances: Vec<ShiftInstance>) -> Vec<ShiftInstance> {
    let mut winners: Vec<ShiftInstance> = Vec::new();
    let mut positions: HashMap<(String, String, String), usize> = HashMap::new();
    let mut passthrough = Vec::new();

    for instance in instances {
        let Some(key) = dedup_key(&instance) else {
            passthrough.push(instance);
            continue;
        };

        match positions.get(&key) {
            Some(&position) => {
                let current = &winners[position];
                if !std::ptr::eq(pick_better_duplicate(current, &instance), current) {
                    winners[position] = instance;
                }
            }
            None => {
                positions.insert(key, winners.len());
                winners.push(instance);
            }
        }
    }

    winners.extend(passthrough);
    winners
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Reference;
    use chrono::NaiveDate;

    fn instance(id: &str) -> ShiftInstance {
        let mut instance = ShiftInstance::new(
            id,
            "south",
            NaiveDate::from_ymd_opt(2026, 2, 2).expect("date"),
        );
        instance.pattern_id = Some(Reference::new("5"));
        instance
    }

    fn permutations(items: &[ShiftInstance]) -> Vec<Vec<ShiftInstance>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut result = Vec::new();
        for index in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(index);
            for mut tail in permutations(&rest) {
                tail.insert(0, head.clone());
                result.push(tail);
            }
        }
        result
    }

    #[test]
    fn status_rank_orders_known_states() {
        assert_eq!(confirmation_status_rank(Some("Accepted")), 4);
        assert_eq!(confirmation_status_rank(Some(" pending ")), 3);
        assert_eq!(confirmation_status_rank(Some("rejected")), 2);
        assert_eq!(confirmation_status_rank(Some("unassigned")), 1);
        assert_eq!(confirmation_status_rank(Some("declined")), 0);
        assert_eq!(confirmation_status_rank(None), 0);
    }

    #[test]
    fn manual_override_outweighs_everything_else() {
        let mut manual = instance("9");
        manual.manual_override = Some(true);

        let mut assigned = instance("1");
        assigned.driver_id = Some(Reference::new("3"));
        assigned.confirmation_status = Some("accepted".to_owned());
        assigned.notes = Some("swap with Tuesday".to_owned());

        assert_eq!(pick_better_duplicate(&manual, &assigned).id, manual.id);
        assert_eq!(pick_better_duplicate(&assigned, &manual).id, manual.id);
    }

    #[test]
    fn ties_keep_the_oldest_numeric_id() {
        let older = instance("4");
        let newer = instance("12");
        let opaque = instance("abc");

        assert_eq!(pick_better_duplicate(&newer, &older).id, older.id);
        assert_eq!(pick_better_duplicate(&older, &newer).id, older.id);
        assert_eq!(pick_better_duplicate(&opaque, &newer).id, newer.id);
        assert_eq!(pick_better_duplicate(&newer, &opaque).id, newer.id);
    }

    #[test]
    fn pick_is_commutative_for_every_pair() {
        let mut with_driver = instance("7");
        with_driver.driver_id = Some(Reference::new("2"));
        let mut with_notes = instance("3");
        with_notes.notes = Some("note".to_owned());
        let plain = instance("2");
        let all = [with_driver, with_notes, plain];

        for left in &all {
            for right in &all {
                assert_eq!(
                    pick_better_duplicate(left, right).id,
                    pick_better_duplicate(right, left).id
                );
            }
        }
    }

    #[test]
    fn winner_is_independent_of_input_order() {
        let mut pending = instance("8");
        pending.confirmation_status = Some("pending".to_owned());
        let mut noted = instance("2");
        noted.notes = Some("bring keys".to_owned());
        let plain = instance("1");
        let mut pending_older = instance("5");
        pending_older.confirmation_status = Some("pending".to_owned());

        let group = [pending, noted, plain, pending_older];
        for ordering in permutations(&group) {
            let reduced = ordering[1..]
                .iter()
                .fold(&ordering[0], |best, candidate| {
                    pick_better_duplicate(best, candidate)
                });
            assert_eq!(reduced.id.as_str(), "5");

            let deduped = dedupe_instances(ordering.clone());
            assert_eq!(deduped.len(), 1);
            assert_eq!(deduped[0].id.as_str(), "5");
        }
    }

    #[test]
    fn rows_missing_a_key_pass_through_after_winners() {
        let mut orphan = instance("30");
        orphan.pattern_id = None;
        let first = instance("10");
        let duplicate = instance("11");
        let mut other_day = instance("12");
        other_day.date = NaiveDate::from_ymd_opt(2026, 2, 3).expect("date");

        let deduped = dedupe_instances(vec![orphan.clone(), first, duplicate, other_day]);
        let ids: Vec<&str> = deduped.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["10", "12", "30"]);
    }
}
