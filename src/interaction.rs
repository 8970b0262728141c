//! User interactions and the manual override trap.
//!
//! Interactions reach a candidate through an [`InteractionRouter`]. The router
//! runs in two phases: armed override traps first, then every registered
//! [`InteractionHandler`] (a lightbox, a link opener) in registration order.
//! A trap that fires prevents the default action and stops propagation, so
//! no handler sees that interaction. Traps are single-use: once fired they are
//! unregistered and cannot be armed again for the same candidate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::candidate::CandidateId;

/// One user gesture on a candidate's element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interaction {
    default_prevented: bool,
    propagation_stopped: bool,
}

impl Interaction {
    /// A fresh, unhandled interaction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the interaction's default action.
    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    /// Keep every later handler from seeing this interaction.
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    /// Whether the default action was cancelled.
    #[must_use]
    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    /// Whether propagation was stopped.
    #[must_use]
    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }
}

/// Something else bound to candidate elements, e.g. an enlarging viewer.
pub trait InteractionHandler: Send + Sync {
    /// React to `interaction` on candidate `id`.
    fn handle(&self, id: &CandidateId, interaction: &mut Interaction);
}

impl<F> InteractionHandler for F
where
    F: Fn(&CandidateId, &mut Interaction) + Send + Sync,
{
    fn handle(&self, id: &CandidateId, interaction: &mut Interaction) {
        self(id, interaction);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trap {
    Armed,
    Fired,
}

/// Subscription handle for an armed trap.
///
/// The trap fires at most once and unregisters itself when it does; the handle
/// can also be used to drop an unfired trap.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct TrapHandle {
    id: CandidateId,
}

impl TrapHandle {
    /// Candidate this trap guards.
    #[must_use]
    pub fn candidate(&self) -> &CandidateId {
        &self.id
    }
}

/// Registry of override traps, one per candidate for its whole lifetime.
#[derive(Debug, Default)]
pub struct OverrideTraps {
    traps: Mutex<HashMap<CandidateId, Trap>>,
}

impl OverrideTraps {
    /// Arm a trap for `id`.
    ///
    /// Returns `None` if a trap was ever armed for `id`, fired or not.
    pub fn arm(&self, id: &CandidateId) -> Option<TrapHandle> {
        let mut traps = self.traps.lock().unwrap_or_else(PoisonError::into_inner);
        if traps.contains_key(id) {
            return None;
        }
        traps.insert(id.clone(), Trap::Armed);
        Some(TrapHandle { id: id.clone() })
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self, id: &CandidateId) -> bool {
        let traps = self.traps.lock().unwrap_or_else(PoisonError::into_inner);
        traps.get(id) == Some(&Trap::Armed)
    }

    /// Fire the trap for `id` if armed, suppressing `interaction`.
    ///
    /// Returns whether the trap fired.
    pub fn fire(&self, id: &CandidateId, interaction: &mut Interaction) -> bool {
        let mut traps = self.traps.lock().unwrap_or_else(PoisonError::into_inner);
        match traps.get_mut(id) {
            Some(trap) if *trap == Trap::Armed => {
                *trap = Trap::Fired;
                interaction.prevent_default();
                interaction.stop_propagation();
                true
            }
            _ => false,
        }
    }

    /// Drop the handle's trap, fired or not, so its candidate can be armed
    /// again.
    pub fn release(&self, handle: &TrapHandle) {
        let mut traps = self.traps.lock().unwrap_or_else(PoisonError::into_inner);
        traps.remove(&handle.id);
    }
}

/// Delivers interactions to traps, then to other handlers.
#[derive(Default)]
pub struct InteractionRouter {
    traps: OverrideTraps,
    handlers: RwLock<Vec<Arc<dyn InteractionHandler>>>,
}

impl InteractionRouter {
    /// Create a router with no traps and no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The trap registry.
    #[must_use]
    pub fn traps(&self) -> &OverrideTraps {
        &self.traps
    }

    /// Register a handler that runs after the trap phase.
    pub fn register(&self, handler: Arc<dyn InteractionHandler>) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers.push(handler);
    }

    /// Deliver `interaction` for `id`. Returns whether an override trap fired.
    pub fn dispatch(&self, id: &CandidateId, interaction: &mut Interaction) -> bool {
        let fired = self.traps.fire(id, interaction);
        if interaction.propagation_stopped() {
            return fired;
        }

        // Snapshot so handlers may register further handlers.
        let handlers: Vec<_> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in handlers {
            handler.handle(id, interaction);
            if interaction.propagation_stopped() {
                break;
            }
        }
        fired
    }
}

impl std::fmt::Debug for InteractionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().map_or(0, |h| h.len());
        f.debug_struct("InteractionRouter")
            .field("traps", &self.traps)
            .field("handlers", &handlers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, Arc<dyn InteractionHandler>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let handler = move |_: &CandidateId, _: &mut Interaction| {
            seen.fetch_add(1, Ordering::SeqCst);
        };
        (count, Arc::new(handler))
    }

    #[test]
    fn trap_fires_once() {
        let traps = OverrideTraps::default();
        let id = CandidateId::new("a");
        let _handle = traps.arm(&id).unwrap();

        let mut first = Interaction::new();
        assert!(traps.fire(&id, &mut first));
        assert!(first.default_prevented());
        assert!(first.propagation_stopped());

        let mut second = Interaction::new();
        assert!(!traps.fire(&id, &mut second));
        assert!(!second.default_prevented());
    }

    #[test]
    fn trap_cannot_be_rearmed() {
        let traps = OverrideTraps::default();
        let id = CandidateId::new("a");
        assert!(traps.arm(&id).is_some());
        assert!(traps.arm(&id).is_none());
        traps.fire(&id, &mut Interaction::new());
        assert!(traps.arm(&id).is_none());
        assert!(!traps.is_armed(&id));
    }

    #[test]
    fn released_trap_does_not_fire() {
        let traps = OverrideTraps::default();
        let id = CandidateId::new("a");
        let handle = traps.arm(&id).unwrap();
        traps.release(&handle);
        assert!(!traps.fire(&id, &mut Interaction::new()));
    }

    #[test]
    fn fired_trap_hides_interaction_from_handlers() {
        let router = InteractionRouter::new();
        let (count, handler) = counter();
        router.register(handler);
        let id = CandidateId::new("a");
        let _handle = router.traps().arm(&id).unwrap();

        let mut first = Interaction::new();
        assert!(router.dispatch(&id, &mut first));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let mut second = Interaction::new();
        assert!(!router.dispatch(&id, &mut second));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!second.default_prevented());
    }

    #[test]
    fn handlers_run_in_order_until_stopped() {
        let router = InteractionRouter::new();
        router.register(Arc::new(|_: &CandidateId, i: &mut Interaction| i.stop_propagation()));
        let (count, handler) = counter();
        router.register(handler);

        router.dispatch(&CandidateId::new("a"), &mut Interaction::new());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unguarded_candidate_reaches_handlers() {
        let router = InteractionRouter::new();
        let (count, handler) = counter();
        router.register(handler);
        assert!(!router.dispatch(&CandidateId::new("b"), &mut Interaction::new()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
