//! Listener bindings keyed by packet type, and the dispatch loop that runs them.

use crate::core::packet::Packet;
use crate::error::{constants, NodeError, Result};
use std::any::{type_name, Any, TypeId};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tracing::{error, trace};

/// Error type listeners may return; any `std::error::Error` converts via `?`.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result returned by every listener handler
pub type HandlerResult = std::result::Result<(), HandlerError>;

type BoundFn = dyn Fn(&dyn Packet) -> HandlerResult + Send + Sync + 'static;

/// A handler bound to the one packet type it accepts.
pub struct ListenerBinding {
    accepts: TypeId,
    packet: &'static str,
    listener: &'static str,
    call: Box<BoundFn>,
}

impl ListenerBinding {
    fn new<P, F>(listener: &'static str, handler: F) -> Self
    where
        P: Packet,
        F: Fn(&P) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            accepts: TypeId::of::<P>(),
            packet: type_name::<P>(),
            listener,
            call: Box::new(move |packet: &dyn Packet| match packet.downcast_ref::<P>() {
                Some(p) => handler(p),
                None => Ok(()),
            }),
        }
    }

    /// True iff the packet's runtime type is the accepted type
    pub fn matches(&self, packet: &dyn Packet) -> bool {
        Any::type_id(packet.as_any()) == self.accepts
    }

    /// Name of the accepted packet type
    pub fn packet_type(&self) -> &'static str {
        self.packet
    }

    /// Name of the listener that owns this binding
    pub fn listener(&self) -> &'static str {
        self.listener
    }
}

/// An object that binds several of its methods as packet handlers.
///
/// ```rust
/// use packet_node::core::packet::JsonPacket;
/// use packet_node::protocol::dispatcher::{Bindings, HandlerResult, ListenerRegistry, PacketListener};
/// use serde::{Deserialize, Serialize};
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use std::sync::Arc;
///
/// #[derive(Default, Serialize, Deserialize)]
/// struct Ping { ts: u64 }
/// impl JsonPacket for Ping { const ID: i32 = 1; }
///
/// #[derive(Default)]
/// struct LastSeen(AtomicU64);
///
/// impl LastSeen {
///     fn on_ping(&self, ping: &Ping) -> HandlerResult {
///         self.0.store(ping.ts, Ordering::Relaxed);
///         Ok(())
///     }
/// }
///
/// impl PacketListener for LastSeen {
///     fn bind(bindings: &mut Bindings<Self>) {
///         bindings.handle(Self::on_ping);
///     }
/// }
///
/// let listeners = ListenerRegistry::new();
/// let seen = Arc::new(LastSeen::default());
/// assert_eq!(listeners.register(seen.clone()).unwrap(), 1);
/// listeners.dispatch(&Ping { ts: 9 }).unwrap();
/// assert_eq!(seen.0.load(Ordering::Relaxed), 9);
/// ```
pub trait PacketListener: Send + Sync + Sized + 'static {
    fn bind(bindings: &mut Bindings<Self>);
}

/// Handler table collected from a [`PacketListener`]
pub struct Bindings<L> {
    listener: Arc<L>,
    entries: Vec<ListenerBinding>,
}

impl<L: Send + Sync + 'static> Bindings<L> {
    /// Bind `handler` for packets of type `P`
    pub fn handle<P: Packet>(&mut self, handler: fn(&L, &P) -> HandlerResult) -> &mut Self {
        let listener = self.listener.clone();
        self.entries.push(ListenerBinding::new::<P, _>(
            type_name::<L>(),
            move |packet: &P| handler(&listener, packet),
        ));
        self
    }
}

/// Outcome of dispatching one packet
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Handlers whose accepted type matched
    pub invoked: usize,
    /// Errors and panics raised by those handlers, in invocation order
    pub failures: Vec<NodeError>,
}

impl DispatchReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Listener registry with per-packet-type fan-out.
///
/// Bindings are kept in registration order; every binding whose accepted
/// type matches a packet is invoked, and a failing handler never prevents
/// the remaining handlers from running.
pub struct ListenerRegistry {
    bindings: RwLock<Vec<Arc<ListenerBinding>>>,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(Vec::new()),
        }
    }

    /// Bind `handler_fn` on `listener` to packets of type `P`.
    pub fn register_listener<L, P>(
        &self,
        listener: Arc<L>,
        handler_fn: fn(&L, &P) -> HandlerResult,
    ) -> Result<()>
    where
        L: Send + Sync + 'static,
        P: Packet,
    {
        self.push(vec![ListenerBinding::new::<P, _>(
            type_name::<L>(),
            move |packet: &P| handler_fn(&listener, packet),
        )])
    }

    /// Bind a closure to packets of type `P`.
    pub fn on<P, F>(&self, handler: F) -> Result<()>
    where
        P: Packet,
        F: Fn(&P) -> HandlerResult + Send + Sync + 'static,
    {
        self.push(vec![ListenerBinding::new::<P, _>(type_name::<F>(), handler)])
    }

    /// Register every handler a [`PacketListener`] binds. Returns the number of bindings added.
    pub fn register<L: PacketListener>(&self, listener: Arc<L>) -> Result<usize> {
        let mut bindings = Bindings {
            listener,
            entries: Vec::new(),
        };
        L::bind(&mut bindings);
        let count = bindings.entries.len();
        self.push(bindings.entries)?;
        Ok(count)
    }

    fn push(&self, entries: Vec<ListenerBinding>) -> Result<()> {
        let mut bindings = self
            .bindings
            .write()
            .map_err(|_| NodeError::LockPoisoned(constants::ERR_LISTENER_REGISTRY_LOCK))?;

        for entry in entries {
            trace!(
                listener = entry.listener,
                packet = entry.packet,
                "Registered listener binding"
            );
            bindings.push(Arc::new(entry));
        }
        Ok(())
    }

    /// Invoke every matching binding with `packet`, in registration order.
    pub fn dispatch(&self, packet: &dyn Packet) -> Result<DispatchReport> {
        // Snapshot so handlers run without the lock held.
        let matching: Vec<Arc<ListenerBinding>> = {
            let bindings = self
                .bindings
                .read()
                .map_err(|_| NodeError::LockPoisoned(constants::ERR_LISTENER_REGISTRY_LOCK))?;
            bindings
                .iter()
                .filter(|b| b.matches(packet))
                .cloned()
                .collect()
        };

        let mut report = DispatchReport::default();
        for binding in matching {
            report.invoked += 1;
            let outcome = catch_unwind(AssertUnwindSafe(|| (binding.call)(packet)));

            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("handler panicked: {}", panic_message(panic.as_ref())),
            };

            error!(
                listener = binding.listener,
                packet = binding.packet,
                id = packet.id(),
                error = %failure,
                "Listener failed to handle packet"
            );
            report.failures.push(NodeError::Dispatch(format!(
                "{} on {}: {failure}",
                binding.listener, binding.packet
            )));
        }

        Ok(report)
    }

    /// Number of bindings accepting packets of type `P`
    pub fn count_for<P: Packet>(&self) -> usize {
        self.bindings
            .read()
            .map(|b| b.iter().filter(|e| e.accepts == TypeId::of::<P>()).count())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.bindings.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
