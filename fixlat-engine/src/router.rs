//! Dispatch of application messages to typed handlers.

use crate::application::MessageReject;
use crate::message::Message;
use crate::session::SessionId;
use std::collections::HashMap;

/// Callback invoked for a routed message.
pub type Handler = Box<dyn Fn(&Message, &SessionId) -> Result<(), MessageReject> + Send + Sync>;

/// A handler bound to one `(BeginString, MsgType)` pair.
pub struct Route {
    begin_string: String,
    msg_type: String,
    handler: Handler,
}

impl Route {
    pub fn new<F>(begin_string: impl Into<String>, msg_type: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Message, &SessionId) -> Result<(), MessageReject> + Send + Sync + 'static,
    {
        Self {
            begin_string: begin_string.into(),
            msg_type: msg_type.into(),
            handler: Box::new(handler),
        }
    }
}

/// Routes inbound application messages by BeginString and MsgType.
#[derive(Default)]
pub struct MessageRouter {
    routes: HashMap<(String, String), Handler>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route, replacing any previous handler for the same key.
    pub fn add_route(&mut self, route: Route) -> &mut Self {
        self.routes
            .insert((route.begin_string, route.msg_type), route.handler);
        self
    }

    /// Dispatch `message` to its handler.
    ///
    /// Messages without a matching route are refused with
    /// "Unsupported Message Type".
    pub fn route(&self, message: &Message, session_id: &SessionId) -> Result<(), MessageReject> {
        let key = (
            message.begin_string().to_string(),
            message.msg_type().to_string(),
        );
        match self.routes.get(&key) {
            Some(handler) => handler(message, session_id),
            None => Err(MessageReject::unsupported_message_type(message.msg_type())),
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
