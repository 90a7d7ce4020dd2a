//! Signal translation.
//!
//! | Signal          | Trigger                 |
//! |-----------------|-------------------------|
//! | SIGHUP          | reconcile now           |
//! | SIGUSR1         | reset VLANs             |
//! | SIGUSR2         | reset all interfaces    |
//! | SIGINT, SIGTERM | shut down               |

use std::io;

use eipconf::daemon::Trigger;
use eipconf::reconcile::ResetScope;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::SignalStream;
use tokio_stream::{Stream, StreamExt};

fn watch(
    kind: SignalKind,
    name: &'static str,
    trigger: Trigger,
) -> io::Result<impl Stream<Item = (&'static str, Trigger)>> {
    Ok(SignalStream::new(signal(kind)?).map(move |()| (name, trigger.clone())))
}

fn shutdown(name: &str) -> Trigger {
    Trigger::Shutdown(format!("terminated by signal: {}", name))
}

/// Start forwarding signals to the reconciler as [`Trigger`]s.
pub fn spawn(tx: mpsc::Sender<Trigger>) -> io::Result<JoinHandle<()>> {
    let stream = watch(SignalKind::hangup(), "SIGHUP", Trigger::Reconcile)?
        .merge(watch(
            SignalKind::user_defined1(),
            "SIGUSR1",
            Trigger::Reset(ResetScope::Vlans),
        )?)
        .merge(watch(
            SignalKind::user_defined2(),
            "SIGUSR2",
            Trigger::Reset(ResetScope::All),
        )?)
        .merge(watch(SignalKind::interrupt(), "SIGINT", shutdown("SIGINT"))?)
        .merge(watch(SignalKind::terminate(), "SIGTERM", shutdown("SIGTERM"))?);

    Ok(tokio::spawn(async move {
        tokio::pin!(stream);
        while let Some((name, trigger)) = stream.next().await {
            tracing::info!(signal = name, %trigger, "Received signal");
            if tx.send(trigger).await.is_err() {
                break;
            }
        }
    }))
}
