//! Ingestion Loop
//!
//! Wakes on a fixed interval and claims at most one Incoming file per tick.
//! Claiming happens synchronously in the ticker; the slow part (decode,
//! reconcile, spreadsheet write, filing) runs in a spawned task that
//! releases the claim when it finishes, so overlapping ticks never pick the
//! same file.
//!
//! Terminal outcomes for the claimed (primary) file:
//!
//! | Condition                               | Stage        |
//! |-----------------------------------------|--------------|
//! | unreadable file                         | Errored      |
//! | unrecognized name, payload won't decode | Mangled      |
//! | no spreadsheet row (match 0, unknown pit team) | Errored |
//! | spreadsheet write failed                | Errored      |
//! | match written                           | Written      |
//! | pit visit written                       | PitWritten   |
//!
//! With multi-scouting on, Written siblings of a match are merged into a
//! consensus row; a rescouting submission instead moves them to Discarded.
//! A sibling that no longer decodes goes to Errored, and failing to move it
//! there stops the loop with [`IngestError::Fatal`].

use async_trait::async_trait;
use gs_common::config::ServerConfig;
use gs_common::row::{consensus_cells, observation_cells, pit_cells, SheetRow, SheetTarget};
use gs_common::{merge, Observation, PitObservation};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{IngestError, StoreError, UserStoreError};
use crate::grouping::{find_siblings, group_key, FileKey};
use crate::roster::TeamRoster;
use crate::sheet::SheetSink;
use crate::store::{FileStore, Stage};

/// Points credited to a scouter per written file
pub const POINTS_PER_FILE: i64 = 1;

/// Receives scouter credit for written files
#[async_trait]
pub trait ScoreLedger: Send + Sync {
    async fn credit(&self, scouter: &str, points: i64) -> Result<(), UserStoreError>;
}

/// Ingestion loop configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Time between ticks (default: 5s)
    pub poll_interval: Duration,

    /// Merge Written siblings into a consensus row (default: false)
    pub multi_scouting: bool,

    /// Failed terminal moves before a file is dead-lettered (default: 3)
    pub max_move_attempts: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            multi_scouting: false,
            max_move_attempts: 3,
        }
    }
}

impl From<&ServerConfig> for IngestConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            multi_scouting: config.multi_scouting,
            max_move_attempts: config.max_move_attempts.max(1),
        }
    }
}

/// Files being processed, and files whose terminal move keeps failing
#[derive(Debug, Default)]
struct ClaimTable {
    in_flight: HashSet<String>,
    move_failures: HashMap<String, u32>,
    dead_letters: HashSet<String>,
}

pub struct Ingestor {
    store: FileStore,
    sink: Arc<dyn SheetSink>,
    roster: Arc<TeamRoster>,
    ledger: Option<Arc<dyn ScoreLedger>>,
    config: IngestConfig,
    claims: Mutex<ClaimTable>,
}

impl Ingestor {
    pub fn new(
        store: FileStore,
        sink: Arc<dyn SheetSink>,
        roster: Arc<TeamRoster>,
        config: IngestConfig,
    ) -> Self {
        Self {
            store,
            sink,
            roster,
            ledger: None,
            config,
            claims: Mutex::new(ClaimTable::default()),
        }
    }

    /// Credit scouters through `ledger` after each written file
    pub fn with_ledger(mut self, ledger: Arc<dyn ScoreLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    fn claims(&self) -> MutexGuard<'_, ClaimTable> {
        // A panic while holding the lock leaves the table consistent
        self.claims.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the first Incoming file that is neither in flight nor
    /// dead-lettered
    ///
    /// A match file whose group (event, match, driver station) already has a
    /// file in flight is skipped, so siblings are reconciled one at a time.
    pub fn claim_next(&self) -> Result<Option<String>, StoreError> {
        let pending = self.store.list_pending(Stage::Incoming)?;
        let mut claims = self.claims();
        for name in pending {
            if claims.in_flight.contains(&name) || claims.dead_letters.contains(&name) {
                continue;
            }
            if let Some(key) = group_key(&name) {
                let busy = claims
                    .in_flight
                    .iter()
                    .any(|other| group_key(other).as_deref() == Some(key.as_str()));
                if busy {
                    debug!(file = %name, "Sibling in flight, leaving for a later tick");
                    continue;
                }
            }
            claims.in_flight.insert(name.clone());
            return Ok(Some(name));
        }
        Ok(None)
    }

    pub fn release(&self, name: &str) {
        self.claims().in_flight.remove(name);
    }

    /// Files skipped after repeated failed moves
    pub fn dead_letters(&self) -> Vec<String> {
        let mut names: Vec<String> = self.claims().dead_letters.iter().cloned().collect();
        names.sort();
        names
    }

    /// Claim, process and release one file
    ///
    /// Returns the claimed file and the stage it was filed to, or `None`
    /// when nothing is pending.
    pub async fn process_next(&self) -> Result<Option<(String, Stage)>, IngestError> {
        let Some(name) = self.claim_next()? else {
            return Ok(None);
        };
        let result = self.process_file(&name).await;
        self.release(&name);
        result.map(|stage| Some((name, stage)))
    }

    /// Run one claimed Incoming file through the state machine
    pub async fn process_file(&self, name: &str) -> Result<Stage, IngestError> {
        let bytes = match self.store.read(Stage::Incoming, name) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(file = %name, error = %e, "Could not read file");
                return self.file_primary(name, Stage::Errored);
            }
        };

        match FileKey::parse(name) {
            Some(FileKey::Pit { .. }) => self.process_pit(name, &bytes).await,
            Some(FileKey::Match { .. }) => self.process_match(name, &bytes).await,
            None => {
                warn!(file = %name, "Unrecognized file name");
                self.file_primary(name, Stage::Mangled)
            }
        }
    }

    async fn process_pit(&self, name: &str, bytes: &[u8]) -> Result<Stage, IngestError> {
        let pit = match PitObservation::decode(bytes) {
            Ok(pit) => pit,
            Err(e) => {
                warn!(file = %name, error = %e, "Pit visit does not decode");
                return self.file_primary(name, Stage::Mangled);
            }
        };

        let row = match self.roster.row_for_pit(pit.team_number) {
            Ok(row) => row,
            Err(e) => {
                error!(file = %name, error = %e, "No pit row");
                return self.file_primary(name, Stage::Errored);
            }
        };

        let sheet_row = SheetRow {
            target: SheetTarget::PitScouting,
            row,
            cells: pit_cells(&pit),
        };
        if let Err(e) = self.sink.write_row(&sheet_row).await {
            error!(file = %name, range = %sheet_row.range(), error = %e, "Spreadsheet write failed");
            return self.file_primary(name, Stage::Errored);
        }

        let stage = self.file_primary(name, Stage::PitWritten)?;
        self.credit(&pit.scouter).await;
        Ok(stage)
    }

    async fn process_match(&self, name: &str, bytes: &[u8]) -> Result<Stage, IngestError> {
        let obs = match Observation::decode(bytes) {
            Ok(obs) => obs,
            Err(e) => {
                warn!(file = %name, error = %e, "Observation does not decode");
                return self.file_primary(name, Stage::Mangled);
            }
        };

        let Some(row) = obs.row() else {
            error!(file = %name, match_number = obs.match_info.number, "No spreadsheet row for match");
            return self.file_primary(name, Stage::Errored);
        };

        let siblings = if self.config.multi_scouting {
            match find_siblings(&self.store, name) {
                Ok(siblings) => siblings,
                Err(e) => {
                    error!(file = %name, error = %e, "Could not list siblings");
                    return self.file_primary(name, Stage::Errored);
                }
            }
        } else {
            Vec::new()
        };

        let cells = if siblings.is_empty() {
            observation_cells(&obs)
        } else if obs.rescouting {
            self.discard_siblings(name, &siblings);
            observation_cells(&obs)
        } else {
            let mut entries = vec![obs.clone()];
            entries.extend(self.load_siblings(name, &siblings)?);
            match merge(&entries) {
                Ok(consensus) => {
                    info!(file = %name, scouters = %consensus.scouters_label(), "Writing consensus row");
                    consensus_cells(&consensus)
                }
                Err(e) => {
                    error!(file = %name, error = %e, "Reconciliation failed");
                    return self.file_primary(name, Stage::Errored);
                }
            }
        };

        let sheet_row = SheetRow {
            target: SheetTarget::RawData,
            row,
            cells,
        };
        if let Err(e) = self.sink.write_row(&sheet_row).await {
            error!(file = %name, range = %sheet_row.range(), error = %e, "Spreadsheet write failed");
            return self.file_primary(name, Stage::Errored);
        }

        let stage = self.file_primary(name, Stage::Written)?;
        self.credit(&obs.scouter).await;
        Ok(stage)
    }

    /// Move superseded siblings out of Written
    fn discard_siblings(&self, name: &str, siblings: &[String]) {
        for sibling in siblings {
            match self.store.move_file(sibling, Stage::Written, Stage::Discarded) {
                Ok(()) => info!(file = %sibling, rescout = %name, "Discarded superseded observation"),
                Err(e) => error!(file = %sibling, error = %e, "Could not discard superseded observation"),
            }
        }
    }

    /// Decode siblings; ones that fail are moved to Errored
    fn load_siblings(&self, name: &str, siblings: &[String]) -> Result<Vec<Observation>, IngestError> {
        let mut entries = Vec::with_capacity(siblings.len());
        for sibling in siblings {
            let decoded = self
                .store
                .read(Stage::Written, sibling)
                .map_err(|e| e.to_string())
                .and_then(|bytes| Observation::decode(&bytes).map_err(|e| e.to_string()));

            match decoded {
                Ok(obs) => entries.push(obs),
                Err(reason) => {
                    if let Err(e) = self.store.move_file(sibling, Stage::Written, Stage::Errored) {
                        error!(file = %sibling, primary = %name, error = %e, "Could not move bad sibling to Errored");
                        return Err(IngestError::Fatal(format!(
                            "sibling {} of {} could not be moved to Errored: {}",
                            sibling, name, e
                        )));
                    }
                    warn!(file = %sibling, primary = %name, reason = %reason, "Sibling moved to Errored");
                }
            }
        }
        Ok(entries)
    }

    /// Move the primary out of Incoming
    ///
    /// A pit visit replaces an earlier visit of the same team in the
    /// destination. A failed move leaves the file in Incoming for the next
    /// tick; after `max_move_attempts` failures it is dead-lettered and no
    /// longer claimed.
    fn file_primary(&self, name: &str, stage: Stage) -> Result<Stage, IngestError> {
        let is_pit = FileKey::parse(name).is_some_and(|key| key.is_pit());
        let moved = if is_pit {
            self.store.replace_file(name, Stage::Incoming, stage)
        } else {
            self.store.move_file(name, Stage::Incoming, stage)
        };
        match moved {
            Ok(()) => {
                self.claims().move_failures.remove(name);
                info!(file = %name, stage = %stage, "Processed file");
                Ok(stage)
            }
            Err(e) => {
                let mut claims = self.claims();
                let failures = claims.move_failures.entry(name.to_string()).or_insert(0);
                *failures += 1;
                let failures = *failures;

                if failures >= self.config.max_move_attempts {
                    claims.move_failures.remove(name);
                    claims.dead_letters.insert(name.to_string());
                    error!(
                        file = %name,
                        stage = %stage,
                        attempts = failures,
                        error = %e,
                        "Giving up on file; it stays in Incoming and will not be retried"
                    );
                } else {
                    warn!(file = %name, stage = %stage, attempts = failures, error = %e, "Move failed, will retry");
                }
                Err(e.into())
            }
        }
    }

    async fn credit(&self, scouter: &str) {
        let Some(ledger) = &self.ledger else {
            return;
        };
        if let Err(e) = ledger.credit(scouter, POINTS_PER_FILE).await {
            warn!(scouter = %scouter, error = %e, "Could not credit scouter");
        }
    }

    /// Tick forever, dispatching one file per tick
    ///
    /// Returns only on a fatal error reported by a tick.
    pub async fn run(self: Arc<Self>) -> Result<(), IngestError> {
        let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();

        let mut timer = interval(self.config.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Starting ingestion loop (interval: {:?}, multi-scouting: {}, root: {})",
            self.config.poll_interval,
            self.config.multi_scouting,
            self.store.root().display()
        );

        loop {
            tokio::select! {
                _ = timer.tick() => self.dispatch(&fatal_tx),
                Some(err) = fatal_rx.recv() => {
                    error!(error = %err, "Ingestion loop stopping");
                    return Err(err);
                }
            }
        }
    }

    fn dispatch(self: &Arc<Self>, fatal_tx: &mpsc::UnboundedSender<IngestError>) {
        let name = match self.claim_next() {
            Ok(Some(name)) => name,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Could not list Incoming");
                return;
            }
        };

        debug!(file = %name, "Claimed file");
        let this = Arc::clone(self);
        let fatal_tx = fatal_tx.clone();
        tokio::spawn(async move {
            let result = this.process_file(&name).await;
            this.release(&name);
            match result {
                Ok(_) => {}
                Err(err @ IngestError::Fatal(_)) => {
                    let _ = fatal_tx.send(err);
                }
                Err(e) => error!(file = %name, error = %e, "File left in Incoming"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use gs_common::row::CellValue;
    use tempfile::TempDir;

    struct NullSink;

    #[async_trait]
    impl SheetSink for NullSink {
        async fn write_range(&self, _range: &str, _values: Vec<Vec<CellValue>>) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn ingestor(dir: &TempDir) -> Ingestor {
        Ingestor::new(
            FileStore::new(dir.path()),
            Arc::new(NullSink),
            Arc::new(TeamRoster::new("ev", vec![118])),
            IngestConfig::default(),
        )
    }

    const OBS: &[u8] = br#"{"Team": 118, "Match": {"Number": 3}, "Scouter": "ada",
        "Driver Station": {"Is Blue": true, "Number": 2}}"#;

    #[test]
    fn test_claims_are_exclusive() {
        let dir = TempDir::new().unwrap();
        let ingestor = ingestor(&dir);
        ingestor.store().write_new(Stage::Incoming, "ev_1_red1_1.json", OBS).unwrap();
        ingestor.store().write_new(Stage::Incoming, "ev_1_red2_2.json", OBS).unwrap();

        let first = ingestor.claim_next().unwrap().unwrap();
        let second = ingestor.claim_next().unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(ingestor.claim_next().unwrap(), None);

        ingestor.release(&first);
        assert_eq!(ingestor.claim_next().unwrap(), Some(first));
    }

    #[test]
    fn test_claim_skips_group_in_flight() {
        let dir = TempDir::new().unwrap();
        let ingestor = ingestor(&dir);
        ingestor.store().write_new(Stage::Incoming, "ev_3_blue2_1.json", OBS).unwrap();
        ingestor.store().write_new(Stage::Incoming, "ev_3_blue2_2.json", OBS).unwrap();

        let first = ingestor.claim_next().unwrap().unwrap();
        assert_eq!(ingestor.claim_next().unwrap(), None);

        ingestor.release(&first);
        let second = ingestor.claim_next().unwrap().unwrap();
        assert_eq!(second, first);
    }

    #[test]
    fn test_claim_allows_other_groups_in_flight() {
        let dir = TempDir::new().unwrap();
        let ingestor = ingestor(&dir);
        ingestor.store().write_new(Stage::Incoming, "ev_3_blue2_1.json", OBS).unwrap();
        ingestor.store().write_new(Stage::Incoming, "ev_3_blue1_2.json", OBS).unwrap();
        ingestor.store().write_new(Stage::Incoming, "ev_118.json", OBS).unwrap();

        let mut claimed = Vec::new();
        while let Some(name) = ingestor.claim_next().unwrap() {
            claimed.push(name);
        }
        claimed.sort();
        assert_eq!(claimed, vec!["ev_118.json", "ev_3_blue1_2.json", "ev_3_blue2_1.json"]);
    }

    #[test]
    fn test_empty_incoming_claims_nothing() {
        let dir = TempDir::new().unwrap();
        assert_eq!(ingestor(&dir).claim_next().unwrap(), None);
    }

    #[tokio::test]
    async fn test_dead_letter_after_repeated_move_failures() {
        let dir = TempDir::new().unwrap();
        let ingestor = ingestor(&dir);
        let name = "ev_3_blue2_1.json";
        ingestor.store().write_new(Stage::Incoming, name, OBS).unwrap();
        // An existing Written file of the same name makes every move fail
        ingestor.store().write_new(Stage::Written, name, OBS).unwrap();

        for _ in 0..3 {
            let result = ingestor.process_next().await;
            assert!(matches!(result, Err(IngestError::Store(StoreError::AlreadyExists { .. }))));
        }

        assert_eq!(ingestor.dead_letters(), vec![name.to_string()]);
        assert_eq!(ingestor.claim_next().unwrap(), None);
        assert!(ingestor.store().contains(Stage::Incoming, name));
    }

    #[tokio::test]
    async fn test_unrecognized_name_is_mangled() {
        let dir = TempDir::new().unwrap();
        let ingestor = ingestor(&dir);
        ingestor.store().write_new(Stage::Incoming, "notes.txt", b"hello").unwrap();

        let (name, stage) = ingestor.process_next().await.unwrap().unwrap();
        assert_eq!(name, "notes.txt");
        assert_eq!(stage, Stage::Mangled);
    }

    #[tokio::test]
    async fn test_match_zero_is_errored() {
        let dir = TempDir::new().unwrap();
        let ingestor = ingestor(&dir);
        let body = br#"{"Team": 118, "Match": {"Number": 0}, "Scouter": "ada",
            "Driver Station": {"Is Blue": false, "Number": 1}}"#;
        ingestor.store().write_new(Stage::Incoming, "ev_0_red1_1.json", body).unwrap();

        let (_, stage) = ingestor.process_next().await.unwrap().unwrap();
        assert_eq!(stage, Stage::Errored);
    }

    #[test]
    fn test_config_from_server_config() {
        let server = ServerConfig {
            multi_scouting: true,
            poll_interval_secs: 2,
            ..Default::default()
        };
        let config = IngestConfig::from(&server);
        assert!(config.multi_scouting);
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.max_move_attempts, 3);
    }
}
