//! Named events and the hook dispatch machinery.
//!
//! Every event has an ordered set of hooks partitioned into five priority
//! tiers. Dispatch walks the tiers from highest to lowest, preserving
//! insertion order within each tier, and folds the hooks' replies into a
//! single [`DispatchOutcome`]. A hook can cancel the event outright or
//! replace its payload for every hook that runs after it.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, error, warn};

use crate::error::RegistryError;
use vadrigar_events::{ClientId, DispatchOutcome, Event, EventName, HookReply, Priority};

/// Unique identifier for a registered hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// A hook handler. Runs on the simulation thread only, so it does not
/// need to be Send; errors are contained at the dispatch boundary.
pub type HookFn = Box<dyn FnMut(&Event) -> anyhow::Result<HookReply>>;

struct HookEntry {
    id: HookId,
    plugin: String,
    handler: HookFn,
}

/// The hooks registered on one event, plus its out-of-band caller slot.
struct EventQueue {
    tiers: [Vec<HookEntry>; 5],
    caller: Option<ClientId>,
}

impl EventQueue {
    fn new() -> Self {
        Self {
            tiers: Default::default(),
            caller: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.tiers.iter().all(|tier| tier.is_empty())
    }

    fn hook_count(&self) -> usize {
        self.tiers.iter().map(|tier| tier.len()).sum()
    }
}

/// Owns the queue for every event name. The set of events is fixed at
/// construction and queues are never destroyed; only their hooks change
/// as plugins load and unload.
pub struct EventRegistry {
    queues: HashMap<EventName, EventQueue>,
    next_id: u64,
}

impl EventRegistry {
    pub fn new() -> Self {
        let mut queues = HashMap::with_capacity(EventName::ALL.len());
        for name in EventName::ALL {
            queues.insert(name, EventQueue::new());
        }
        Self { queues, next_id: 0 }
    }

    fn queue_mut(&mut self, name: EventName) -> &mut EventQueue {
        // Every name is inserted in new(), so the entry always exists.
        self.queues.entry(name).or_insert_with(EventQueue::new)
    }

    /// Register a hook on an event at the given priority tier.
    pub fn add_hook(
        &mut self,
        event: EventName,
        plugin: &str,
        priority: Priority,
        handler: HookFn,
    ) -> HookId {
        let id = HookId(self.next_id);
        self.next_id += 1;

        debug!(
            target: "events",
            "Adding {} hook on '{}' for plugin '{}'",
            format!("{:?}", priority).to_lowercase(),
            event,
            plugin
        );

        self.queue_mut(event).tiers[priority.index()].push(HookEntry {
            id,
            plugin: plugin.to_string(),
            handler,
        });
        id
    }

    /// Remove a previously registered hook. Removing an unknown hook is an
    /// error reported to the caller, not a fault.
    pub fn remove_hook(&mut self, event: EventName, id: HookId) -> Result<(), RegistryError> {
        let queue = self.queue_mut(event);
        for tier in queue.tiers.iter_mut() {
            if let Some(pos) = tier.iter().position(|entry| entry.id == id) {
                let entry = tier.remove(pos);
                debug!(
                    target: "events",
                    "Removed hook on '{}' for plugin '{}'",
                    event,
                    entry.plugin
                );
                return Ok(());
            }
        }
        Err(RegistryError::HookNotFound { event, id })
    }

    /// Number of hooks currently registered on an event.
    pub fn hook_count(&self, event: EventName) -> usize {
        self.queues.get(&event).map_or(0, |q| q.hook_count())
    }

    /// Stash the identity that initiated the action behind `event`, so the
    /// next dispatch of it can carry the caller. Read once, then cleared.
    pub fn set_caller(&mut self, event: EventName, client: ClientId) {
        self.queue_mut(event).caller = Some(client);
    }

    /// Consume the stashed caller for `event`, if any.
    pub fn take_caller(&mut self, event: EventName) -> Option<ClientId> {
        self.queue_mut(event).caller.take()
    }

    /// Invoke every hook on the event, highest tier first, and fold their
    /// replies.
    ///
    /// A replacement payload rewrites the event seen by every subsequent
    /// hook in this dispatch. A cancel stops the walk immediately. A hook
    /// that fails or panics is logged and counts as having no opinion; it
    /// never aborts the frame.
    pub fn dispatch(&mut self, event: Event) -> DispatchOutcome {
        let name = event.name();
        let queue = self.queue_mut(name);
        if queue.is_empty() {
            return DispatchOutcome::Unhandled;
        }

        let mut current = event;
        let mut outcome = DispatchOutcome::Pass;

        for tier in queue.tiers.iter_mut() {
            for entry in tier.iter_mut() {
                let reply =
                    catch_unwind(AssertUnwindSafe(|| (entry.handler)(&current)));

                match reply {
                    Err(panic) => {
                        error!(
                            target: "events",
                            "Hook from plugin '{}' panicked while handling '{}': {:?}",
                            entry.plugin,
                            name,
                            panic
                        );
                    }
                    Ok(Err(e)) => {
                        error!(
                            target: "events",
                            "Hook from plugin '{}' failed while handling '{}': {:#}",
                            entry.plugin,
                            name,
                            e
                        );
                    }
                    Ok(Ok(HookReply::Pass)) => {}
                    Ok(Ok(HookReply::Cancel)) => {
                        debug!(
                            target: "events",
                            "'{}' cancelled by plugin '{}'",
                            name,
                            entry.plugin
                        );
                        return DispatchOutcome::Cancel;
                    }
                    Ok(Ok(HookReply::ReplaceText(text))) => match current.with_text(&text) {
                        Some(replaced) => {
                            current = replaced;
                            outcome = DispatchOutcome::Text(text);
                        }
                        None => {
                            warn!(
                                target: "events",
                                "Plugin '{}' returned a text override for '{}', which has no text payload",
                                entry.plugin,
                                name
                            );
                        }
                    },
                    Ok(Ok(HookReply::ReplaceVars(vars))) => match current.with_vars(vars.clone()) {
                        Some(replaced) => {
                            current = replaced;
                            outcome = DispatchOutcome::Vars(vars);
                        }
                        None => {
                            warn!(
                                target: "events",
                                "Plugin '{}' returned a variable override for '{}', which has no variable payload",
                                entry.plugin,
                                name
                            );
                        }
                    },
                }
            }
        }

        outcome
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use vadrigar_events::Channel;

    fn chat_event(msg: &str) -> Event {
        Event::Chat {
            client: 0,
            msg: msg.to_string(),
            channel: Channel::Chat,
        }
    }

    #[test]
    fn test_dispatch_without_hooks_is_unhandled() {
        let mut registry = EventRegistry::new();
        for name in EventName::ALL {
            assert_eq!(registry.hook_count(name), 0);
        }
        assert_eq!(
            registry.dispatch(Event::Frame),
            DispatchOutcome::Unhandled
        );
    }

    #[test]
    fn test_tier_order_and_insertion_order() {
        let mut registry = EventRegistry::new();
        let calls = Rc::new(RefCell::new(Vec::new()));

        for (label, priority) in [
            ("low", Priority::Low),
            ("normal_a", Priority::Normal),
            ("highest", Priority::Highest),
            ("normal_b", Priority::Normal),
        ] {
            let calls = calls.clone();
            registry.add_hook(
                EventName::Chat,
                "test",
                priority,
                Box::new(move |_| {
                    calls.borrow_mut().push(label);
                    Ok(HookReply::Pass)
                }),
            );
        }

        let outcome = registry.dispatch(chat_event("hi"));
        assert_eq!(outcome, DispatchOutcome::Pass);
        assert_eq!(
            *calls.borrow(),
            vec!["highest", "normal_a", "normal_b", "low"]
        );
    }

    #[test]
    fn test_cancel_stops_lower_tiers() {
        let mut registry = EventRegistry::new();
        let ran_low = Rc::new(RefCell::new(false));

        registry.add_hook(
            EventName::Chat,
            "canceller",
            Priority::High,
            Box::new(|_| Ok(HookReply::Cancel)),
        );
        let flag = ran_low.clone();
        registry.add_hook(
            EventName::Chat,
            "observer",
            Priority::Normal,
            Box::new(move |_| {
                *flag.borrow_mut() = true;
                Ok(HookReply::Pass)
            }),
        );

        assert_eq!(registry.dispatch(chat_event("hi")), DispatchOutcome::Cancel);
        assert!(!*ran_low.borrow());
    }

    #[test]
    fn test_replacement_is_seen_downstream() {
        let mut registry = EventRegistry::new();
        let seen = Rc::new(RefCell::new(String::new()));

        registry.add_hook(
            EventName::Chat,
            "rewriter",
            Priority::High,
            Box::new(|_| Ok(HookReply::ReplaceText("rewritten".to_string()))),
        );
        let seen_clone = seen.clone();
        registry.add_hook(
            EventName::Chat,
            "observer",
            Priority::Normal,
            Box::new(move |event| {
                *seen_clone.borrow_mut() = event.text().unwrap_or("").to_string();
                Ok(HookReply::Pass)
            }),
        );

        let outcome = registry.dispatch(chat_event("original"));
        assert_eq!(outcome, DispatchOutcome::Text("rewritten".to_string()));
        assert_eq!(*seen.borrow(), "rewritten");
    }

    #[test]
    fn test_failing_hook_does_not_stop_dispatch() {
        let mut registry = EventRegistry::new();
        let ran = Rc::new(RefCell::new(false));

        registry.add_hook(
            EventName::Chat,
            "broken",
            Priority::High,
            Box::new(|_| Err(anyhow::anyhow!("boom"))),
        );
        registry.add_hook(
            EventName::Chat,
            "panicky",
            Priority::High,
            Box::new(|_| panic!("very boom")),
        );
        let flag = ran.clone();
        registry.add_hook(
            EventName::Chat,
            "survivor",
            Priority::Normal,
            Box::new(move |_| {
                *flag.borrow_mut() = true;
                Ok(HookReply::Pass)
            }),
        );

        assert_eq!(registry.dispatch(chat_event("hi")), DispatchOutcome::Pass);
        assert!(*ran.borrow());
    }

    #[test]
    fn test_add_then_remove_is_inverse() {
        let mut registry = EventRegistry::new();
        let id = registry.add_hook(
            EventName::Frame,
            "test",
            Priority::Normal,
            Box::new(|_| Ok(HookReply::Pass)),
        );
        assert_eq!(registry.hook_count(EventName::Frame), 1);

        registry.remove_hook(EventName::Frame, id).unwrap();
        assert_eq!(registry.hook_count(EventName::Frame), 0);

        // A second removal has nothing to match.
        assert!(matches!(
            registry.remove_hook(EventName::Frame, id),
            Err(RegistryError::HookNotFound { .. })
        ));
    }

    #[test]
    fn test_caller_is_read_once() {
        let mut registry = EventRegistry::new();
        registry.set_caller(EventName::VoteStarted, 4);
        assert_eq!(registry.take_caller(EventName::VoteStarted), Some(4));
        assert_eq!(registry.take_caller(EventName::VoteStarted), None);
    }
}
