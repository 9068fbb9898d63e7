//! One transfer attempt: resume detection, request, and the chunked write loop.

use std::io::ErrorKind;
use std::path::Path;

use futures_util::StreamExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use super::{Finish, ProgressReporter};
use crate::download::DownloadError;
use crate::download::client::{FetchReply, HttpClient};
use crate::download::constants::CHUNK_SIZE;
use crate::download::session::{ControlState, TransferSession};

/// How the response body maps onto the destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WritePlan {
    /// Bytes already on disk that this attempt keeps.
    offset: u64,
    /// Leading body bytes to drop because they are already on disk.
    skip: u64,
    /// Full resource size, when the response declares it.
    total: Option<u64>,
}

/// Runs a single attempt against the network.
///
/// # Errors
///
/// Returns `DownloadError` for any network, protocol or filesystem failure;
/// the retry layer decides what happens next.
#[instrument(skip_all, fields(url = %session.source_url(), path = %session.destination().display()))]
pub(super) async fn run(
    client: &HttpClient,
    session: &TransferSession,
    reporter: &ProgressReporter,
) -> Result<Finish, DownloadError> {
    if session.wait_while_paused().await == ControlState::Cancelled {
        return Ok(Finish::Cancelled);
    }

    let url = session.source_url();
    let destination = session.destination();

    ensure_parent_dir(destination).await?;
    let resume_from = existing_len(destination).await?;
    session.set_resume_offset(resume_from);
    debug!(resume_from, "resolved resume offset");

    session.mark_started();
    let reply = tokio::select! {
        reply = client.fetch(url, resume_from) => reply?,
        () = session.cancelled() => return Ok(cancelled(session)),
    };

    let (response, plan) = match reply {
        FetchReply::RangeNotSatisfiable { total } => {
            return if resume_from > 0 && total == Some(resume_from) {
                record_total(session, url, resume_from)?;
                info!(bytes = resume_from, "destination already complete");
                Ok(Finish::Completed)
            } else {
                Err(DownloadError::http_status(url, 416))
            };
        }
        FetchReply::Partial {
            response,
            range,
            content_length,
        } => {
            if range.start != Some(resume_from) {
                return Err(DownloadError::malformed(
                    url,
                    format!(
                        "requested bytes from {resume_from}, server sent range starting at {}",
                        range.start.unwrap_or_default()
                    ),
                ));
            }
            let total = range
                .total
                .or_else(|| content_length.map(|len| resume_from.saturating_add(len)));
            (
                response,
                WritePlan {
                    offset: resume_from,
                    skip: 0,
                    total,
                },
            )
        }
        FetchReply::Full {
            response,
            content_length,
        } => (response, plan_full_body(resume_from, content_length)),
    };

    if plan.offset < resume_from {
        // Progress already reported by this session must not move backwards.
        if session.bytes_received() > 0 {
            return Err(DownloadError::malformed(
                url,
                format!(
                    "resource shrank to {} bytes after {resume_from} were written",
                    plan.total.unwrap_or_default()
                ),
            ));
        }
        warn!(
            resume_from,
            "server ignored the range request and the partial file does not fit the resource; restarting from zero"
        );
        session.set_resume_offset(0);
    } else if plan.skip > 0 {
        debug!(skip = plan.skip, "server ignored the range request; skipping bytes already on disk");
    }

    if let Some(total) = plan.total {
        record_total(session, url, total)?;
        if plan.offset > total {
            return Err(DownloadError::malformed(
                url,
                format!("partial file holds {} bytes but resource is {total}", plan.offset),
            ));
        }
    }

    let mut file = open_destination(destination, plan.offset > 0).await?;
    let mut body = response.bytes_stream();
    let mut skip = plan.skip;

    loop {
        let next = tokio::select! {
            next = body.next() => next,
            () = session.cancelled() => return Ok(cancelled(session)),
        };
        let Some(next) = next else {
            break;
        };
        let bytes = next.map_err(|e| DownloadError::from_reqwest(url, e))?;
        let mut data = &bytes[..];

        if skip > 0 {
            let dropped = usize::try_from(skip).unwrap_or(usize::MAX).min(data.len());
            data = &data[dropped..];
            skip -= dropped as u64;
        }

        for chunk in data.chunks(CHUNK_SIZE) {
            let len = chunk.len() as u64;
            if let Some(total) = plan.total
                && session.bytes_transferred().saturating_add(len) > total
            {
                return Err(DownloadError::overrun(url, total));
            }

            write_chunk(&mut file, chunk, destination).await?;
            session.record_written(len);
            reporter.maybe_emit(session);

            if session.wait_while_paused().await == ControlState::Cancelled {
                return Ok(cancelled(session));
            }
        }
    }

    if skip > 0 {
        return Err(DownloadError::malformed(
            url,
            "full response is shorter than the partial file already on disk",
        ));
    }

    let transferred = session.bytes_transferred();
    if let Some(total) = plan.total
        && transferred < total
    {
        return Err(DownloadError::incomplete(url, total, transferred));
    }

    info!(bytes = transferred, "transfer complete");
    Ok(Finish::Completed)
}

fn cancelled(session: &TransferSession) -> Finish {
    info!(
        bytes = session.bytes_transferred(),
        "transfer cancelled, partial file kept"
    );
    Finish::Cancelled
}

/// Decides how to use a `200` body when `resume_from` bytes are already on disk.
///
/// A `200` is the whole resource. If it is at least as long as the partial
/// file, the leading bytes are skipped; if it is declared shorter, the partial
/// file belongs to something else and the transfer starts over.
fn plan_full_body(resume_from: u64, content_length: Option<u64>) -> WritePlan {
    match content_length {
        Some(len) if len < resume_from => WritePlan {
            offset: 0,
            skip: 0,
            total: Some(len),
        },
        _ => WritePlan {
            offset: resume_from,
            skip: resume_from,
            total: content_length,
        },
    }
}

fn record_total(session: &TransferSession, url: &str, total: u64) -> Result<(), DownloadError> {
    session.resolve_total(total).map_err(|previous| {
        DownloadError::malformed(
            url,
            format!("resource size changed from {previous} to {total} bytes"),
        )
    })
}

async fn ensure_parent_dir(destination: &Path) -> Result<(), DownloadError> {
    let Some(parent) = destination.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| DownloadError::io(parent, e))
}

async fn existing_len(destination: &Path) -> Result<u64, DownloadError> {
    match tokio::fs::metadata(destination).await {
        Ok(meta) if meta.is_file() => Ok(meta.len()),
        Ok(_) => Err(DownloadError::io(
            destination,
            std::io::Error::new(ErrorKind::InvalidInput, "destination is not a regular file"),
        )),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(DownloadError::io(destination, e)),
    }
}

async fn open_destination(destination: &Path, append: bool) -> Result<File, DownloadError> {
    let result = if append {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(destination)
            .await
    } else {
        File::create(destination).await
    };
    result.map_err(|e| DownloadError::io(destination, e))
}

/// Writes and flushes one chunk; the on-disk size matches the session
/// counter once this returns.
async fn write_chunk(file: &mut File, chunk: &[u8], destination: &Path) -> Result<(), DownloadError> {
    file.write_all(chunk)
        .await
        .map_err(|e| DownloadError::io(destination, e))?;
    file.flush()
        .await
        .map_err(|e| DownloadError::io(destination, e))
}
