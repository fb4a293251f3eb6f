//! Process exit codes derived from the outcome of a run.

use std::error::Error as StdError;
use std::process::ExitCode;

use romfetch_core::{DriveError, OAuthError};

use crate::mapping::MappingError;
use crate::oauth_flow::OAuthFlowError;
use crate::provider::ProviderError;
use crate::storage::StorageError;
use crate::sync::SyncError;
use crate::sync::transfer::TransferError;
use crate::token_provider::TokenProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Synced,
    Local,
    Auth,
    Transport,
    PartialFailure,
    Interrupted,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Synced => 0,
            ExitStatus::Local => 1,
            ExitStatus::Auth => 2,
            ExitStatus::Transport => 3,
            ExitStatus::PartialFailure => 4,
            ExitStatus::Interrupted => 130,
        }
    }

    /// Classifies a failed run by the first recognised error in its chain.
    /// Anything unrecognised is treated as a local/configuration problem.
    pub fn from_error(err: &anyhow::Error) -> Self {
        err.chain()
            .find_map(classify)
            .unwrap_or(ExitStatus::Local)
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}

fn classify(err: &(dyn StdError + 'static)) -> Option<ExitStatus> {
    if let Some(err) = err.downcast_ref::<SyncError>() {
        return Some(match err {
            SyncError::Provider(err) => provider_status(err),
            SyncError::Transfer(err) => transfer_status(err),
            SyncError::Local { .. } | SyncError::Path(_) => ExitStatus::Local,
        });
    }
    if let Some(err) = err.downcast_ref::<TransferError>() {
        return Some(transfer_status(err));
    }
    if let Some(err) = err.downcast_ref::<ProviderError>() {
        return Some(provider_status(err));
    }
    if let Some(err) = err.downcast_ref::<DriveError>() {
        return Some(drive_status(err));
    }
    if let Some(err) = err.downcast_ref::<TokenProviderError>() {
        return Some(match err {
            TokenProviderError::OAuth(err) => oauth_status(err),
            TokenProviderError::MissingOAuthClient | TokenProviderError::MissingRefreshToken => {
                ExitStatus::Auth
            }
        });
    }
    if let Some(err) = err.downcast_ref::<OAuthFlowError>() {
        return Some(match err {
            OAuthFlowError::OAuth(err) => oauth_status(err),
            OAuthFlowError::MissingCode
            | OAuthFlowError::StateMismatch
            | OAuthFlowError::Timeout => ExitStatus::Auth,
            OAuthFlowError::Io(_)
            | OAuthFlowError::ClientSecret(_)
            | OAuthFlowError::MissingClientSection => ExitStatus::Local,
        });
    }
    if let Some(err) = err.downcast_ref::<OAuthError>() {
        return Some(oauth_status(err));
    }
    if err.downcast_ref::<StorageError>().is_some() || err.downcast_ref::<MappingError>().is_some()
    {
        return Some(ExitStatus::Local);
    }
    if err.downcast_ref::<reqwest::Error>().is_some() {
        return Some(ExitStatus::Transport);
    }
    None
}

fn transfer_status(err: &TransferError) -> ExitStatus {
    match err {
        TransferError::Provider(err) => provider_status(err),
        TransferError::IntegrityMismatch { .. } => ExitStatus::Transport,
        TransferError::Io(_) | TransferError::ConcurrencyClosed => ExitStatus::Local,
    }
}

fn provider_status(err: &ProviderError) -> ExitStatus {
    match err {
        ProviderError::Drive(err) => drive_status(err),
    }
}

fn drive_status(err: &DriveError) -> ExitStatus {
    if err.is_auth() {
        ExitStatus::Auth
    } else {
        ExitStatus::Transport
    }
}

fn oauth_status(err: &OAuthError) -> ExitStatus {
    match err {
        OAuthError::Request(_) => ExitStatus::Transport,
        OAuthError::Url(_) => ExitStatus::Local,
        OAuthError::Api { .. } => ExitStatus::Auth,
    }
}
