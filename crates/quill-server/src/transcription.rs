//! Gates and accounts for a single transcription request.

use bytes::Bytes;
use tracing::{info, instrument, warn};

use quill_core::ids::UserId;
use quill_core::pricing::TRANSCRIPTION_COST;
use quill_gateway::speech::{SpeechToText, TranscribeOptions};
use quill_store::ledger::{EntryKind, LedgerRepo};

use crate::error::ApiError;

/// Upload format allow-list. Anything else is rejected before the audio
/// leaves this process.
pub const ALLOWED_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "ogg"];

/// Upload size ceiling (also enforced as the HTTP body limit).
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Whether a transcription request is admitted against the caller's
/// balance. `Enforce` rejects requests the caller cannot cover; `Advisory`
/// preserves the historical behavior of debiting regardless, which can
/// drive a balance negative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CreditPolicy {
    #[default]
    Enforce,
    Advisory,
}

impl CreditPolicy {
    /// Read QUILL_CREDIT_POLICY from the environment; anything other than
    /// "advisory" means Enforce.
    pub fn from_env() -> Self {
        match std::env::var("QUILL_CREDIT_POLICY").as_deref() {
            Ok("advisory") => Self::Advisory,
            _ => Self::Enforce,
        }
    }
}

fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Format and size validation, before any balance or upstream work.
pub fn validate_upload(filename: &str, size: usize) -> Result<(), ApiError> {
    let ext = extension_of(filename)
        .ok_or_else(|| ApiError::UnsupportedFormat(filename.to_string()))?;
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ApiError::UnsupportedFormat(format!(".{ext}")));
    }
    if size > MAX_UPLOAD_BYTES {
        return Err(ApiError::FileTooLarge {
            size,
            limit: MAX_UPLOAD_BYTES,
        });
    }
    Ok(())
}

/// Validate, forward to the speech collaborator, and debit on success.
///
/// The debit lands only after the collaborator confirms success: a failed
/// transcription never charges the user. Under `Enforce`, admission is
/// checked before the upstream call; concurrent requests that all pass
/// admission can still overlap between check and debit, which is accepted
/// in favor of always charging for delivered work.
#[instrument(skip(ledger, speech, audio, options), fields(user_id = %user_id, filename, bytes = audio.len()))]
pub async fn transcribe_upload(
    ledger: &LedgerRepo,
    speech: &dyn SpeechToText,
    policy: CreditPolicy,
    user_id: &UserId,
    audio: Bytes,
    filename: &str,
    options: &TranscribeOptions,
) -> Result<String, ApiError> {
    validate_upload(filename, audio.len())?;

    if policy == CreditPolicy::Enforce {
        let balance = ledger.balance(user_id)?;
        if balance < TRANSCRIPTION_COST {
            return Err(ApiError::InsufficientCredits {
                balance,
                required: TRANSCRIPTION_COST,
            });
        }
    }

    let text = speech
        .transcribe(audio, filename, options)
        .await
        .map_err(|e| {
            warn!(kind = e.error_kind(), detail = %e, "speech collaborator failed");
            ApiError::TranscriptionFailed
        })?;

    ledger.append(user_id, -TRANSCRIPTION_COST, EntryKind::Usage)?;
    info!(cost = TRANSCRIPTION_COST, "transcription debited");

    Ok(text)
}
