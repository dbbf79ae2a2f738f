use dossier_ledger::LedgerError;
use dossier_store::BlobError;

/// Errors that abort a repair or audit run.
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error("record store error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("blob store error: {0}")]
    Blob(#[from] BlobError),
}

pub type RepairResult<T> = Result<T, RepairError>;
