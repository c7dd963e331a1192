//! Maps one inbound command to one collaborator call and one reply.
//!
//! Every command is acknowledged with the same reply kind whether or not the call
//! succeeded; failures are logged and carried in the reply body and in [`OpOutcome`].

use std::sync::Arc;
use tracing::{info, warn};

use crate::exec::{ExecOutcome, Executor};
use crate::resources::{OpOutcome, ResourceManager};
use crate::types::{InboundKind, InboundMessage, OutboundMessage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Send `message`; `outcome` records what the collaborator reported.
    Reply {
        message: OutboundMessage,
        outcome: OpOutcome,
    },
    /// Not a command: the session applies its idle policy.
    Idle,
}

#[derive(Clone)]
pub struct Dispatcher {
    resources: Arc<dyn ResourceManager>,
    executor: Arc<dyn Executor>,
}

fn op_reply(outcome: OpOutcome) -> Dispatch {
    Dispatch::Reply {
        message: OutboundMessage::result(outcome.message.clone()),
        outcome,
    }
}

// Body is the combined output either way.
fn exec_reply(what: &str, out: ExecOutcome) -> Dispatch {
    if let Some(e) = &out.error {
        warn!("{what} failed: {e}");
    }
    op_reply(OpOutcome {
        success: out.error.is_none(),
        message: out.output,
    })
}

impl Dispatcher {
    pub fn new(resources: Arc<dyn ResourceManager>, executor: Arc<dyn Executor>) -> Self {
        Self {
            resources,
            executor,
        }
    }

    pub async fn dispatch(&self, msg: &InboundMessage) -> Dispatch {
        let data = msg.payload.as_str();
        match msg.kind {
            InboundKind::StartContainer => op_reply(self.resources.start(data).await),
            InboundKind::StopContainer => op_reply(self.resources.stop(data).await),
            InboundKind::RemoveContainer => op_reply(self.resources.remove(data).await),
            InboundKind::RemoveImage => op_reply(self.resources.remove_image(data).await),
            InboundKind::RunScript => exec_reply("script", self.executor.run_script(data).await),
            InboundKind::RunCommand => {
                exec_reply("command", self.executor.run_command(data).await)
            }
            InboundKind::Restart => {
                info!("reboot requested by controller");
                let outcome = match self.executor.reboot().await {
                    Ok(()) => OpOutcome::ok(),
                    Err(e) => {
                        warn!("reboot failed: {e}");
                        OpOutcome::failed(e.to_string())
                    }
                };
                Dispatch::Reply {
                    message: OutboundMessage::restarted(),
                    outcome,
                }
            }
            InboundKind::Ok | InboundKind::Unknown(_) => Dispatch::Idle,
        }
    }
}
