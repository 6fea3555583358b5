//! Dispatch table for unsolicited packets, keyed by tag.
//!
//! Handlers run inline on the receive loop, so packets are seen in wire
//! order. A handler that needs to do real work should hand it off to a
//! task or channel.
//!
//! # Example
//!
//! ```
//! use sc64_link::handler::{ButtonPacket, PacketRegistry};
//! use bytes::Bytes;
//!
//! let mut registry = PacketRegistry::new();
//! registry.register(|_: ButtonPacket| println!("button pressed"));
//! registry.register_raw(b'X', |payload: Bytes| println!("aux {:?}", payload));
//!
//! assert!(registry.contains(b'B'));
//! registry.dispatch(b'B', Bytes::new()).unwrap();
//! ```

use std::collections::HashMap;
use std::marker::PhantomData;

use bytes::Bytes;

use super::DecodePacket;
use crate::error::{LinkError, Result};

/// Trait for packet handlers.
pub trait PacketHandler: Send + Sync + 'static {
    /// Handle one packet payload.
    fn call(&self, payload: Bytes) -> Result<()>;
}

/// Wrapper that decodes the payload before calling the handler.
pub struct TypedHandler<F, P> {
    handler: F,
    _phantom: PhantomData<fn(P)>,
}

impl<F, P> TypedHandler<F, P>
where
    F: Fn(P) + Send + Sync + 'static,
    P: DecodePacket,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, P> PacketHandler for TypedHandler<F, P>
where
    F: Fn(P) + Send + Sync + 'static,
    P: DecodePacket,
{
    fn call(&self, payload: Bytes) -> Result<()> {
        let packet = P::decode(payload)?;
        (self.handler)(packet);
        Ok(())
    }
}

/// Wrapper for handlers that take the undecoded payload.
pub struct RawHandler<F> {
    handler: F,
}

impl<F> PacketHandler for RawHandler<F>
where
    F: Fn(Bytes) + Send + Sync + 'static,
{
    fn call(&self, payload: Bytes) -> Result<()> {
        (self.handler)(payload);
        Ok(())
    }
}

/// Registry mapping packet tags to handlers.
#[derive(Default)]
pub struct PacketRegistry {
    handlers: HashMap<u8, Box<dyn PacketHandler>>,
}

impl PacketRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler under `P::TAG`, replacing any previous one.
    pub fn register<P, F>(&mut self, handler: F)
    where
        P: DecodePacket,
        F: Fn(P) + Send + Sync + 'static,
    {
        self.insert(P::TAG, Box::new(TypedHandler::new(handler)));
    }

    /// Register a handler for the raw payload of `tag`.
    pub fn register_raw<F>(&mut self, tag: u8, handler: F)
    where
        F: Fn(Bytes) + Send + Sync + 'static,
    {
        self.insert(tag, Box::new(RawHandler { handler }));
    }

    /// Register a prebuilt handler.
    pub fn insert(&mut self, tag: u8, handler: Box<dyn PacketHandler>) {
        if self.handlers.insert(tag, handler).is_some() {
            tracing::debug!(tag = %char::from(tag), "replaced packet handler");
        }
    }

    /// Check whether `tag` has a handler.
    pub fn contains(&self, tag: u8) -> bool {
        self.handlers.contains_key(&tag)
    }

    /// Number of registered tags.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Route a payload to the handler for `tag`.
    pub fn dispatch(&self, tag: u8, payload: Bytes) -> Result<()> {
        match self.handlers.get(&tag) {
            Some(handler) => handler.call(payload),
            None => Err(LinkError::HandlerNotFound(tag)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{AuxPacket, PrintfPacket};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_registry_creation() {
        let registry = PacketRegistry::new();
        assert!(registry.is_empty());
        assert!(!registry.contains(b'X'));
    }

    #[test]
    fn test_typed_dispatch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let mut registry = PacketRegistry::new();
        registry.register(move |p: AuxPacket| sink.lock().unwrap().push(p.value));

        registry.dispatch(b'X', Bytes::from_static(&[0, 0, 0, 7])).unwrap();
        registry.dispatch(b'X', Bytes::from_static(&[0, 0, 0, 9])).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![7, 9]);
    }

    #[test]
    fn test_raw_dispatch() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();

        let mut registry = PacketRegistry::new();
        registry.register_raw(b'Z', move |payload| *sink.lock().unwrap() = Some(payload));

        registry.dispatch(b'Z', Bytes::from_static(b"new")).unwrap();
        assert_eq!(seen.lock().unwrap().as_deref(), Some(&b"new"[..]));
    }

    #[test]
    fn test_unknown_tag() {
        let registry = PacketRegistry::new();
        let err = registry.dispatch(b'Q', Bytes::new()).unwrap_err();
        assert!(matches!(err, LinkError::HandlerNotFound(b'Q')));
    }

    #[test]
    fn test_decode_error_is_returned() {
        let mut registry = PacketRegistry::new();
        registry.register(|_: AuxPacket| panic!("must not be called"));

        let err = registry.dispatch(b'X', Bytes::from_static(&[1])).unwrap_err();
        assert!(matches!(err, LinkError::MalformedPacket { tag: b'X', .. }));
    }

    #[test]
    fn test_register_replaces() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = seen.clone();
        let second = seen.clone();

        let mut registry = PacketRegistry::new();
        registry.register(move |p: PrintfPacket| first.lock().unwrap().push(format!("1:{}", p.text)));
        registry.register(move |p: PrintfPacket| second.lock().unwrap().push(format!("2:{}", p.text)));

        registry.dispatch(b'I', Bytes::from_static(b"boot")).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["2:boot".to_string()]);
    }
}
