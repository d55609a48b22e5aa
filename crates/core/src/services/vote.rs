//! Vote service.

use std::fmt::Write as _;

use chrono::{SecondsFormat, Utc};
use sea_orm::Set;
use serde::Serialize;
use tally_common::{AppResult, Fingerprinter};
use tally_db::{
    entities::{Choice, vote},
    repositories::{InsertOutcome, VoteRepository},
};
use tracing::{debug, info};

use super::backup::BackupService;

/// Header row of the CSV export.
pub const CSV_HEADER: &str = "id,choice,fingerprint,user_agent,ip,created_at";

/// Result of casting a vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The vote was recorded.
    Inserted(vote::Model),
    /// This client has voted before; nothing changed.
    AlreadyVoted,
}

/// Vote counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub yes: u64,
    pub no: u64,
    pub total: u64,
}

impl Tally {
    /// Share of `choice` in percent, 0 when nobody voted.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self, choice: Choice) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let count = match choice {
            Choice::Yes => self.yes,
            Choice::No => self.no,
        };
        count as f64 * 100.0 / self.total as f64
    }
}

/// Vote service for business logic.
#[derive(Clone)]
pub struct VoteService {
    repo: VoteRepository,
    fingerprinter: Fingerprinter,
    backup: BackupService,
}

impl VoteService {
    /// Create a new vote service.
    #[must_use]
    pub const fn new(
        repo: VoteRepository,
        fingerprinter: Fingerprinter,
        backup: BackupService,
    ) -> Self {
        Self {
            repo,
            fingerprinter,
            backup,
        }
    }

    /// Fingerprint of a client.
    #[must_use]
    pub fn fingerprint(&self, ip: &str, user_agent: &str) -> String {
        self.fingerprinter.fingerprint(ip, user_agent)
    }

    /// Record a vote unless this fingerprint has voted already.
    ///
    /// `choice` is validated before the store is touched.
    pub async fn cast_vote(
        &self,
        choice: &str,
        fingerprint: &str,
        ip: &str,
        user_agent: &str,
    ) -> AppResult<VoteOutcome> {
        let choice: Choice = choice.parse()?;

        let model = vote::ActiveModel {
            choice: Set(choice),
            fingerprint: Set(fingerprint.to_string()),
            user_agent: Set(Some(user_agent.to_string())),
            ip: Set(Some(ip.to_string())),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        match self.repo.insert_if_absent(model).await? {
            InsertOutcome::Inserted(vote) => {
                info!(id = vote.id, choice = %vote.choice, "Vote recorded");
                self.backup.request_backup();
                Ok(VoteOutcome::Inserted(vote))
            }
            InsertOutcome::Duplicate => {
                debug!(fingerprint = %fingerprint, "Duplicate vote ignored");
                Ok(VoteOutcome::AlreadyVoted)
            }
        }
    }

    /// Current counts.
    pub async fn tally(&self) -> AppResult<Tally> {
        let yes = self.repo.count_by_choice(Choice::Yes).await?;
        let no = self.repo.count_by_choice(Choice::No).await?;
        Ok(Tally {
            yes,
            no,
            total: yes + no,
        })
    }

    /// All votes, newest first.
    pub async fn list_recent(&self) -> AppResult<Vec<vote::Model>> {
        self.repo.find_all_recent().await
    }

    /// Delete every vote. Returns the number removed.
    pub async fn reset(&self) -> AppResult<u64> {
        let deleted = self.repo.delete_all().await?;
        info!(deleted, "Votes reset");
        self.backup.request_backup();
        Ok(deleted)
    }

    /// All votes as CSV.
    pub async fn export_csv(&self) -> AppResult<String> {
        let votes = self.repo.find_all_recent().await?;
        Ok(render_csv(&votes))
    }
}

/// Render votes as CSV with a header row.
#[must_use]
pub fn render_csv(votes: &[vote::Model]) -> String {
    let mut out = String::with_capacity(64 * (votes.len() + 1));
    out.push_str(CSV_HEADER);
    out.push_str("\r\n");

    for vote in votes {
        let created_at = vote.created_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let _ = write!(
            out,
            "{},{},{},{},{},{}\r\n",
            vote.id,
            vote.choice,
            csv_field(&vote.fingerprint),
            csv_field(vote.user_agent.as_deref().unwrap_or_default()),
            csv_field(vote.ip.as_deref().unwrap_or_default()),
            created_at,
        );
    }

    out
}

fn csv_field(value: &str) -> std::borrow::Cow<'_, str> {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\"")).into()
    } else {
        value.into()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;
    use tally_common::AppError;
    use tally_db::test_utils::TestDatabase;

    fn service(test_db: &TestDatabase) -> VoteService {
        let repo = VoteRepository::new(test_db.shared());
        let (backup, _worker) = BackupService::new(
            None,
            repo.clone(),
            test_db.path().to_path_buf(),
            Duration::from_secs(5),
        );
        VoteService::new(repo, Fingerprinter::new("pepper"), backup)
    }

    fn model(id: i32, user_agent: &str) -> vote::Model {
        vote::Model {
            id,
            choice: Choice::Yes,
            fingerprint: format!("fp{id}"),
            user_agent: Some(user_agent.to_string()),
            ip: None,
            created_at: Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_invalid_choice_inserts_nothing() {
        let test_db = TestDatabase::create_unique().await.unwrap();
        let votes = service(&test_db);

        for bad in ["maybe", "YES", "", " yes"] {
            let result = votes.cast_vote(bad, "fp", "1.2.3.4", "ua").await;
            assert!(matches!(result, Err(AppError::Validation(_))), "{bad:?}");
        }
        assert_eq!(votes.tally().await.unwrap(), Tally::default());

        test_db.drop_database().await.unwrap();
    }

    #[tokio::test]
    async fn test_vote_flow() {
        let test_db = TestDatabase::create_unique().await.unwrap();
        let votes = service(&test_db);

        let a = votes.fingerprint("203.0.113.1", "Firefox");
        let b = votes.fingerprint("203.0.113.2", "Firefox");

        let first = votes.cast_vote("yes", &a, "203.0.113.1", "Firefox").await.unwrap();
        assert!(matches!(first, VoteOutcome::Inserted(ref v) if v.choice == Choice::Yes));
        assert_eq!(votes.tally().await.unwrap().yes, 1);

        let again = votes.cast_vote("yes", &a, "203.0.113.1", "Firefox").await.unwrap();
        assert_eq!(again, VoteOutcome::AlreadyVoted);
        assert_eq!(votes.tally().await.unwrap().yes, 1);

        // A change of heart is still a second vote
        let switch = votes.cast_vote("no", &a, "203.0.113.1", "Firefox").await.unwrap();
        assert_eq!(switch, VoteOutcome::AlreadyVoted);

        let other = votes.cast_vote("no", &b, "203.0.113.2", "Firefox").await.unwrap();
        assert!(matches!(other, VoteOutcome::Inserted(_)));

        let tally = votes.tally().await.unwrap();
        assert_eq!(tally, Tally { yes: 1, no: 1, total: 2 });
        assert!((tally.percent(Choice::Yes) - 50.0).abs() < f64::EPSILON);

        test_db.drop_database().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_casts_single_insert() {
        let test_db = TestDatabase::create_unique().await.unwrap();
        let votes = service(&test_db);
        let fp = votes.fingerprint("198.51.100.9", "curl");

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let votes = votes.clone();
                let fp = fp.clone();
                tokio::spawn(async move { votes.cast_vote("yes", &fp, "198.51.100.9", "curl").await })
            })
            .collect();

        let mut inserted = 0;
        for handle in handles {
            if matches!(handle.await.unwrap().unwrap(), VoteOutcome::Inserted(_)) {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);

        test_db.drop_database().await.unwrap();
    }

    #[tokio::test]
    async fn test_reset() {
        let test_db = TestDatabase::create_unique().await.unwrap();
        let votes = service(&test_db);

        for i in 0..4 {
            votes
                .cast_vote("yes", &format!("fp{i}"), "10.0.0.1", "ua")
                .await
                .unwrap();
        }

        assert_eq!(votes.reset().await.unwrap(), 4);
        assert_eq!(votes.tally().await.unwrap().total, 0);
        assert!(votes.list_recent().await.unwrap().is_empty());

        test_db.drop_database().await.unwrap();
    }

    #[tokio::test]
    async fn test_export_csv_order() {
        let test_db = TestDatabase::create_unique().await.unwrap();
        let votes = service(&test_db);
        votes.cast_vote("yes", "first", "10.0.0.1", "ua").await.unwrap();
        votes.cast_vote("no", "second", "10.0.0.2", "ua").await.unwrap();

        let csv = votes.export_csv().await.unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("2,no,second,"));

        test_db.drop_database().await.unwrap();
    }

    #[test]
    fn test_render_csv_quotes_fields() {
        let csv = render_csv(&[
            model(1, "plain"),
            model(2, "Mozilla/5.0 (X11, Linux)"),
            model(3, "say \"hi\""),
            model(4, "two\nlines"),
        ]);

        let expected = concat!(
            "id,choice,fingerprint,user_agent,ip,created_at\r\n",
            "1,yes,fp1,plain,,2025-03-04T05:06:07Z\r\n",
            "2,yes,fp2,\"Mozilla/5.0 (X11, Linux)\",,2025-03-04T05:06:07Z\r\n",
            "3,yes,fp3,\"say \"\"hi\"\"\",,2025-03-04T05:06:07Z\r\n",
            "4,yes,fp4,\"two\nlines\",,2025-03-04T05:06:07Z\r\n",
        );
        assert_eq!(csv, expected);
    }

    #[test]
    fn test_percent_without_votes() {
        assert!(Tally::default().percent(Choice::No).abs() < f64::EPSILON);
    }
}
