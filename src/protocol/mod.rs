//! # Listener Dispatch
//!
//! Routes decoded packets to the handlers registered for their type.
//!
//! Handlers are registered explicitly: a closure per packet type via
//! [`ListenerRegistry::on`](dispatcher::ListenerRegistry::on), a method on a
//! shared object via `register_listener`, or a whole
//! [`PacketListener`](dispatcher::PacketListener) that binds several methods at once.

pub mod dispatcher;
