use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;

use crate::error::InputError;
use crate::models::{FraudCase, OperatorMarker, TransactionId};

/// Operator edits for one review cycle, keyed by transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewSession {
    edits: BTreeMap<TransactionId, OperatorMarker>,
}

impl ReviewSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session from a freshly loaded pending set.
    pub fn seeded(pending: &[FraudCase]) -> Self {
        let mut session = Self::new();
        session.reseed(pending);
        session
    }

    /// Align the session with a reloaded pending set. Rows that left the set are
    /// dropped; new pending rows start undecided; surviving edits are kept.
    pub fn reseed(&mut self, pending: &[FraudCase]) {
        let mut edits = BTreeMap::new();
        for case in pending {
            let marker = self
                .edits
                .get(&case.transaction_id)
                .copied()
                .unwrap_or(case.operator_fraud_marker);
            edits.insert(case.transaction_id, marker);
        }
        self.edits = edits;
    }

    /// Record a verdict, adding the row if the grid did not have it yet.
    pub fn set(&mut self, transaction_id: TransactionId, marker: OperatorMarker) {
        self.edits.insert(transaction_id, marker);
    }

    pub fn add_row(&mut self, transaction_id: TransactionId) -> bool {
        if self.edits.contains_key(&transaction_id) {
            return false;
        }
        self.edits.insert(transaction_id, OperatorMarker::Undecided);
        true
    }

    pub fn remove_row(&mut self, transaction_id: TransactionId) -> Option<OperatorMarker> {
        self.edits.remove(&transaction_id)
    }

    pub fn marker(&self, transaction_id: TransactionId) -> Option<OperatorMarker> {
        self.edits.get(&transaction_id).copied()
    }

    pub fn rows(&self) -> impl Iterator<Item = (TransactionId, OperatorMarker)> + '_ {
        self.edits.iter().map(|(id, marker)| (*id, *marker))
    }

    pub fn decided_count(&self) -> usize {
        self.edits.values().filter(|marker| marker.is_decided()).count()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

impl FromStr for OperatorMarker {
    type Err = InputError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fraud" | "true" | "1" | "yes" => Ok(OperatorMarker::Fraud),
            "legit" | "false" | "0" | "no" => Ok(OperatorMarker::Legit),
            "undecided" | "" | "null" => Ok(OperatorMarker::Undecided),
            _ => Err(InputError::MalformedVerdict {
                raw: raw.to_string(),
            }),
        }
    }
}

/// Parse a positive transaction id typed by an operator.
pub fn parse_transaction_id(raw: &str) -> Result<TransactionId, InputError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(InputError::EmptyTransactionId);
    }
    match trimmed.parse::<TransactionId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(InputError::MalformedTransactionId {
            raw: raw.to_string(),
        }),
    }
}

/// Parse a `<transaction_id>=<verdict>` token.
pub fn parse_decision(raw: &str) -> Result<(TransactionId, OperatorMarker), InputError> {
    let (id, verdict) = raw
        .split_once('=')
        .ok_or_else(|| InputError::MalformedDecision {
            raw: raw.to_string(),
        })?;
    Ok((parse_transaction_id(id)?, verdict.parse()?))
}

/// Read decisions exported from a spreadsheet: `transaction_id,operator_fraud_marker`.
pub fn read_decisions_csv(path: &Path) -> anyhow::Result<Vec<(TransactionId, OperatorMarker)>> {
    #[derive(Deserialize)]
    struct CsvRow {
        transaction_id: String,
        #[serde(default)]
        operator_fraud_marker: String,
    }

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut decisions = Vec::new();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("malformed row {} in {}", line + 2, path.display()))?;
        let transaction_id = parse_transaction_id(&row.transaction_id)
            .with_context(|| format!("row {} in {}", line + 2, path.display()))?;
        let marker: OperatorMarker = row
            .operator_fraud_marker
            .parse()
            .with_context(|| format!("row {} in {}", line + 2, path.display()))?;
        decisions.push((transaction_id, marker));
    }

    Ok(decisions)
}
