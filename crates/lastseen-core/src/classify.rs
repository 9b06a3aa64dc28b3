//! Member classification against the activity threshold.

use chrono::{DateTime, Utc};

use crate::activity::ActivityRecord;
use crate::model::{ActivityThreshold, Member};

/// Where a member falls relative to the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// No message from this member in any reachable source.
    NeverPosted,
    /// Last message strictly before the threshold.
    Inactive(DateTime<Utc>),
    /// Last message at or after the threshold.
    Active(DateTime<Utc>),
}

impl Activity {
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        match self {
            Activity::NeverPosted => None,
            Activity::Inactive(at) | Activity::Active(at) => Some(*at),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Activity::Active(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedMember {
    pub member: Member,
    pub activity: Activity,
}

/// Classify every human member, preserving roster order.
///
/// Automated members are dropped entirely.
pub fn classify(
    members: &[Member],
    record: &ActivityRecord,
    threshold: ActivityThreshold,
) -> Vec<ClassifiedMember> {
    members
        .iter()
        .filter(|m| !m.automated)
        .map(|member| {
            let activity = match record.last_seen(&member.id) {
                None => Activity::NeverPosted,
                Some(at) if threshold.is_before(at) => Activity::Inactive(at),
                Some(at) => Activity::Active(at),
            };
            ClassifiedMember {
                member: member.clone(),
                activity,
            }
        })
        .collect()
}

/// Counts per classification bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassificationCounts {
    pub never_posted: usize,
    pub inactive: usize,
    pub active: usize,
}

impl ClassificationCounts {
    pub fn tally(results: &[ClassifiedMember]) -> Self {
        results.iter().fold(Self::default(), |mut acc, r| {
            match r.activity {
                Activity::NeverPosted => acc.never_posted += 1,
                Activity::Inactive(_) => acc.inactive += 1,
                Activity::Active(_) => acc.active += 1,
            }
            acc
        })
    }

    pub fn total(&self) -> usize {
        self.never_posted + self.inactive + self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::days_ago;

    #[test]
    fn test_buckets() {
        let mut record = ActivityRecord::new();
        record.observe("active", days_ago(1));
        record.observe("edge", days_ago(30));
        record.observe("stale", days_ago(45));

        let members = vec![
            Member::human("active", "Active"),
            Member::human("edge", "Edge"),
            Member::human("stale", "Stale"),
            Member::human("ghost", "Ghost"),
        ];
        let threshold = ActivityThreshold::at(days_ago(30));

        let results = classify(&members, &record, threshold);
        let activities: Vec<_> = results.iter().map(|r| r.activity).collect();
        assert_eq!(
            activities,
            vec![
                Activity::Active(days_ago(1)),
                Activity::Active(days_ago(30)),
                Activity::Inactive(days_ago(45)),
                Activity::NeverPosted,
            ]
        );
    }

    #[test]
    fn test_bots_excluded() {
        let mut record = ActivityRecord::new();
        record.observe("helper", days_ago(1));

        let members = vec![Member::bot("helper", "Helper"), Member::human("u", "U")];
        let results = classify(&members, &record, ActivityThreshold::at(days_ago(30)));

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].member.id, "u");
        assert_eq!(results[0].activity, Activity::NeverPosted);
    }

    #[test]
    fn test_fifty_members_ten_never_posted_in_roster_order() {
        let members: Vec<Member> = (0..50)
            .map(|i| Member::human(format!("m{}", i), format!("member-{}", i)))
            .collect();

        let mut record = ActivityRecord::new();
        for (i, member) in members.iter().enumerate() {
            if i % 5 != 0 {
                record.observe(&member.id, days_ago((i % 60) as i64));
            }
        }

        let results = classify(&members, &record, ActivityThreshold::at(days_ago(30)));

        let never: Vec<_> = results
            .iter()
            .filter(|r| r.activity == Activity::NeverPosted)
            .map(|r| r.member.id.clone())
            .collect();
        let expected: Vec<_> = (0..50).step_by(5).map(|i| format!("m{}", i)).collect();
        assert_eq!(never, expected);

        let order: Vec<_> = results.iter().map(|r| r.member.id.clone()).collect();
        let roster: Vec<_> = members.iter().map(|m| m.id.clone()).collect();
        assert_eq!(order, roster);
    }

    #[test]
    fn test_partition_covers_every_human() {
        let members: Vec<Member> = (0..30)
            .map(|i| {
                if i % 7 == 0 {
                    Member::bot(format!("b{}", i), "bot")
                } else {
                    Member::human(format!("h{}", i), "human")
                }
            })
            .collect();
        let mut record = ActivityRecord::new();
        for i in 0..30 {
            if i % 3 != 0 {
                record.observe(&format!("h{}", i), days_ago(i));
            }
        }

        let results = classify(&members, &record, ActivityThreshold::at(days_ago(15)));
        let counts = ClassificationCounts::tally(&results);

        let humans = members.iter().filter(|m| !m.automated).count();
        assert_eq!(results.len(), humans);
        assert_eq!(counts.total(), humans);
        assert!(results.iter().all(|r| !r.member.automated));
    }

    #[test]
    fn test_last_seen_accessor() {
        assert_eq!(Activity::NeverPosted.last_seen(), None);
        assert_eq!(Activity::Inactive(days_ago(3)).last_seen(), Some(days_ago(3)));
        assert!(Activity::Active(days_ago(1)).is_active());
        assert!(!Activity::NeverPosted.is_active());
    }
}
