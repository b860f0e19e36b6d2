//! Fan-out of many calls, one task per call.

use pbxlink_fabric::Transport;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::call::{OutCall, OutCallResponse};
use crate::client::Client;
use crate::error::{Error, Result};

/// Result of one call placed by [`dial_all`]
#[derive(Debug)]
pub struct CallOutcome {
    pub call: OutCall,
    pub result: Result<OutCallResponse>,
}

/// Place every call concurrently and wait for all of them
///
/// Each worker owns its descriptor and result. Cancelling `cancel` makes
/// unfinished workers give up with [`Error::Cancelled`]. Outcomes come back
/// in the order of `calls`, one per call; a worker that panics is reported
/// as [`Error::WorkerFailed`].
pub async fn dial_all<T>(
    client: &Client<T>,
    calls: Vec<OutCall>,
    cancel: CancellationToken,
) -> Vec<CallOutcome>
where
    T: Transport + 'static,
{
    let mut slots: Vec<Option<CallOutcome>> = calls.iter().map(|_| None).collect();
    let mut workers = JoinSet::new();

    for (index, call) in calls.iter().cloned().enumerate() {
        let client = client.clone();
        let cancel = cancel.clone();
        workers.spawn(async move {
            let result = dial(&client, &call, &cancel).await;
            (index, CallOutcome { call, result })
        });
    }

    info!(workers = workers.len(), "Waiting for all calls to finish");
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((index, outcome)) => slots[index] = Some(outcome),
            Err(e) => warn!(error = %e, "Dial worker did not complete"),
        }
    }

    slots
        .into_iter()
        .zip(calls)
        .map(|(slot, call)| {
            slot.unwrap_or(CallOutcome {
                call,
                result: Err(Error::WorkerFailed),
            })
        })
        .collect()
}

/// Place one call, giving up early if `cancel` fires
pub async fn dial<T: Transport>(
    client: &Client<T>,
    call: &OutCall,
    cancel: &CancellationToken,
) -> Result<OutCallResponse> {
    let span = info_span!("dial", phone_number = %call.dest_phone_number);

    async move {
        info!("Process started");
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = client.make_call(call) => result,
        };

        match &result {
            Ok(response) => info!(status = response.response_status, "Success"),
            Err(e) => warn!(error = %e, "Making out call"),
        }
        info!("Process finished");
        result
    }
    .instrument(span)
    .await
}
