use std::{collections::VecDeque, sync::Mutex, time::Duration};

use crate::{
    client::{PreparedRequest, ProtocolClient, Response},
    error::TransportError,
};

pub enum Reply {
    Respond(Response),
    Delay(Duration, Response),
    Fail(TransportError),
}

/// Replies from a script, in order, then answers `200` forever.
pub struct ScriptedClient {
    script: Mutex<VecDeque<Reply>>,
    sent: Mutex<Vec<PreparedRequest>>,
}

impl ScriptedClient {
    pub fn new(script: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<PreparedRequest> {
        self.sent.lock().unwrap().clone()
    }
}

impl ProtocolClient for ScriptedClient {
    async fn send(&self, request: PreparedRequest) -> Result<Response, TransportError> {
        self.sent.lock().unwrap().push(request);
        let reply = self.script.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Delay(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Some(Reply::Fail(error)) => Err(error),
            None => Ok(Response::new(200)),
        }
    }
}
