use nanorpc_core::NanoRpcError;
use nanorpc_wire::{ResponseType, WireError};
use prost::Message;
use tokio::sync::oneshot;

use crate::supervisor::ClientSupervisor;
use crate::transport::ReconnectTransport;

/// Installs a single-shot callback that decodes the response payload into
/// `A`, signalling the result on the returned channel. `response_to_error`
/// classification is applied first: a non-`OK` status short-circuits to
/// `Err` without attempting to decode `A` from `data`.
pub async fn get_response<T, Q, A>(
    supervisor: &ClientSupervisor<T>,
    path: impl Into<String>,
    request: &Q,
) -> oneshot::Receiver<Result<A, NanoRpcError>>
where
    T: ReconnectTransport,
    Q: Message,
    A: Message + Default + 'static,
{
    let (tx, rx) = oneshot::channel();
    let data = request.encode_to_vec();

    let tx = std::sync::Mutex::new(Some(tx));
    let result = supervisor
        .request(
            path,
            data,
            Box::new(move |resp| {
                let Some(tx) = tx.lock().unwrap().take() else {
                    return;
                };
                let outcome = match resp {
                    None => Err(NanoRpcError::Termination),
                    Some(resp) => match nanorpc_core::NanoRpcError::response_to_error(&resp) {
                        Some(err) => Err(err),
                        None => A::decode(resp.data.as_slice())
                            .map_err(|e| NanoRpcError::from(WireError::from(e))),
                    },
                };
                let _ = tx.send(outcome);
            }),
        )
        .await;

    if let Err(e) = result {
        // The callback above was dropped unused; report the send failure
        // directly instead of leaving the receiver hanging.
        let (tx2, rx2) = oneshot::channel();
        let _ = tx2.send(Err(e));
        return rx2;
    }

    rx
}

/// Wraps a raw subscribe callback so each incoming `RESPONSE`/`UPDATE`
/// decodes into a fresh `A` before calling `user_cb`. An empty `data` on an
/// otherwise-OK response is mapped to `NoResponse`, matching the protocol's
/// "empty data" convention for subscription teardown notices.
pub async fn subscribe<T, Q, A, F>(
    supervisor: &ClientSupervisor<T>,
    path: impl Into<String>,
    request: &Q,
    mut user_cb: F,
) -> Result<i32, NanoRpcError>
where
    T: ReconnectTransport,
    Q: Message,
    A: Message + Default + 'static,
    F: FnMut(i32, Result<A, NanoRpcError>) + Send + 'static,
{
    let data = request.encode_to_vec();
    supervisor
        .subscribe(
            path,
            data,
            Box::new(move |resp| {
                let Some(resp) = resp else {
                    user_cb(0, Err(NanoRpcError::Termination));
                    return;
                };
                let request_id = resp.request_id;
                let is_update = ResponseType::from_i32(resp.response_type)
                    == Some(ResponseType::Update);
                let outcome = match nanorpc_core::NanoRpcError::response_to_error(&resp) {
                    Some(err) => Err(err),
                    None if resp.data.is_empty() && is_update => Err(NanoRpcError::Termination),
                    None => A::decode(resp.data.as_slice())
                        .map_err(|e| NanoRpcError::from(WireError::from(e))),
                };
                user_cb(request_id, outcome);
            }),
        )
        .await
}
