//! Policy evaluator.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{Entry, Policy, PolicyKind};

use super::{PolicyFilter, Status, Visibility};

/// Whether a policy's window is open at `now`.
///
/// The window is `[start, end)`. A policy with no start is never in effect.
pub fn is_active(policy: &Policy, now: DateTime<Utc>) -> bool {
    match policy.start {
        Some(start) if start <= now => policy.end.is_none_or(|end| now < end),
        _ => false,
    }
}

/// Evaluates entry visibility, with or without policies.
#[derive(Debug, Clone, Copy)]
pub struct PolicyEvaluator {
    use_policy: bool,
}

impl PolicyEvaluator {
    pub fn new(use_policy: bool) -> Self {
        Self { use_policy }
    }

    pub fn uses_policy(&self) -> bool {
        self.use_policy
    }

    /// Evaluate one entry against the policies that belong to it.
    pub fn evaluate(&self, entry: &Entry, policies: &[Policy], now: DateTime<Utc>) -> Visibility {
        if !self.use_policy {
            return Visibility {
                published: entry.is_active,
                pinned: false,
                status: if entry.is_active {
                    Status::Published
                } else {
                    Status::Draft
                },
            };
        }

        let find = |kind: PolicyKind| {
            policies
                .iter()
                .find(|p| p.entry == entry.id && p.kind == kind)
        };
        let publish = find(PolicyKind::Publish);
        let pin = find(PolicyKind::Pin);

        let published = publish.is_some_and(|p| is_active(p, now));
        let pinned = published && pin.is_some_and(|p| is_active(p, now));

        let status = if pinned {
            Status::Pinned
        } else if published {
            Status::Published
        } else {
            match publish {
                Some(Policy {
                    start: Some(start), ..
                }) if *start > now => Status::Scheduled,
                Some(Policy { end: Some(end), .. }) if *end <= now => Status::Expired,
                _ => Status::Draft,
            }
        };

        Visibility {
            published,
            pinned,
            status,
        }
    }

    /// Filter entries and order them: pinned first, then newest first.
    ///
    /// `policies` may cover any superset of the given entries.
    pub fn apply(
        &self,
        filter: PolicyFilter,
        entries: Vec<Entry>,
        policies: &[Policy],
        now: DateTime<Utc>,
    ) -> Vec<(Entry, Visibility)> {
        let mut by_entry: HashMap<i64, Vec<Policy>> = HashMap::new();
        for policy in policies {
            by_entry.entry(policy.entry).or_default().push(policy.clone());
        }

        let mut selected: Vec<(Entry, Visibility)> = entries
            .into_iter()
            .filter_map(|entry| {
                let own = by_entry.get(&entry.id).map(Vec::as_slice).unwrap_or_default();
                let visibility = self.evaluate(&entry, own, now);
                visibility.matches(filter).then_some((entry, visibility))
            })
            .collect();

        selected.sort_by(|(a, va), (b, vb)| listing_order(a, va, b, vb));
        selected
    }
}

fn listing_order(a: &Entry, va: &Visibility, b: &Entry, vb: &Visibility) -> Ordering {
    vb.pinned
        .cmp(&va.pinned)
        .then_with(|| b.create_date.cmp(&a.create_date))
        .then_with(|| b.id.cmp(&a.id))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::Duration;
    use uuid::Uuid;

    use super::*;

    fn entry(id: i64, created: DateTime<Utc>) -> Entry {
        Entry {
            id,
            title: format!("Post {id}"),
            data: String::new(),
            author_id: Uuid::nil(),
            create_date: created,
            last_modified: created,
            is_active: false,
            template: None,
            fields: serde_json::json!({}),
        }
    }

    fn policy(
        id: i64,
        entry: i64,
        kind: PolicyKind,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Policy {
        Policy {
            id,
            entry,
            kind,
            start,
            end,
        }
    }

    #[test]
    fn window_is_half_open() {
        let now = Utc::now();
        let p = policy(1, 1, PolicyKind::Publish, Some(now), Some(now + Duration::hours(1)));

        assert!(is_active(&p, now));
        assert!(is_active(&p, now + Duration::minutes(59)));
        assert!(!is_active(&p, now + Duration::hours(1)));
        assert!(!is_active(&p, now - Duration::seconds(1)));
    }

    #[test]
    fn policy_without_start_is_never_active() {
        let now = Utc::now();
        let p = policy(1, 1, PolicyKind::Publish, None, None);
        assert!(!is_active(&p, now));
    }

    #[test]
    fn unpublished_pin_does_not_pin() {
        let now = Utc::now();
        let e = entry(1, now);
        let policies = vec![
            policy(1, 1, PolicyKind::Publish, None, None),
            policy(2, 1, PolicyKind::Pin, Some(now - Duration::hours(1)), None),
        ];

        let v = PolicyEvaluator::new(true).evaluate(&e, &policies, now);
        assert!(!v.published);
        assert!(!v.pinned);
        assert_eq!(v.status, Status::Draft);
    }

    #[test]
    fn status_distinguishes_scheduled_and_expired() {
        let now = Utc::now();
        let evaluator = PolicyEvaluator::new(true);
        let e = entry(1, now);

        let scheduled = [policy(1, 1, PolicyKind::Publish, Some(now + Duration::days(1)), None)];
        assert_eq!(evaluator.evaluate(&e, &scheduled, now).status, Status::Scheduled);

        let expired = [policy(
            1,
            1,
            PolicyKind::Publish,
            Some(now - Duration::days(2)),
            Some(now - Duration::days(1)),
        )];
        let v = evaluator.evaluate(&e, &expired, now);
        assert_eq!(v.status, Status::Expired);
        assert!(v.is_draft());

        assert_eq!(evaluator.evaluate(&e, &[], now).status, Status::Draft);
    }

    #[test]
    fn policies_of_other_entries_are_ignored() {
        let now = Utc::now();
        let e = entry(1, now);
        let foreign = [policy(1, 2, PolicyKind::Publish, Some(now), None)];
        assert!(!PolicyEvaluator::new(true).evaluate(&e, &foreign, now).published);
    }

    #[test]
    fn without_policies_the_active_flag_decides() {
        let now = Utc::now();
        let mut e = entry(1, now);
        let evaluator = PolicyEvaluator::new(false);
        let ignored = [policy(1, 1, PolicyKind::Publish, Some(now), None)];

        assert!(!evaluator.evaluate(&e, &ignored, now).published);
        e.is_active = true;
        let v = evaluator.evaluate(&e, &ignored, now);
        assert!(v.published);
        assert!(!v.pinned);
        assert_eq!(v.status, Status::Published);
    }

    #[test]
    fn apply_filters_and_orders_pinned_first() {
        let now = Utc::now();
        let older = now - Duration::days(2);
        let entries = vec![
            entry(1, older),
            entry(2, now - Duration::days(1)),
            entry(3, now),
            entry(4, now),
        ];
        let policies = vec![
            policy(1, 1, PolicyKind::Publish, Some(older), None),
            policy(2, 1, PolicyKind::Pin, Some(older), None),
            policy(3, 2, PolicyKind::Publish, Some(older), None),
            policy(4, 3, PolicyKind::Publish, None, None),
            policy(5, 4, PolicyKind::Publish, Some(older), None),
        ];
        let evaluator = PolicyEvaluator::new(true);

        let published: Vec<i64> = evaluator
            .apply(PolicyFilter::Published, entries.clone(), &policies, now)
            .into_iter()
            .map(|(e, _)| e.id)
            .collect();
        assert_eq!(published, vec![1, 4, 2]);

        let drafts: Vec<i64> = evaluator
            .apply(PolicyFilter::Draft, entries.clone(), &policies, now)
            .into_iter()
            .map(|(e, _)| e.id)
            .collect();
        assert_eq!(drafts, vec![3]);

        let pinned: Vec<i64> = evaluator
            .apply(PolicyFilter::Pinned, entries.clone(), &policies, now)
            .into_iter()
            .map(|(e, _)| e.id)
            .collect();
        assert_eq!(pinned, vec![1]);

        assert_eq!(
            evaluator.apply(PolicyFilter::None, entries, &policies, now).len(),
            4
        );
    }
}
