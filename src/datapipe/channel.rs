//! The generic channel ("datapipe") primitive (C1, §3.1/§4.1).
//!
//! Mirrors the teacher's `Fsm` design in spirit — a small engine driving a
//! fixed set of registered callbacks in a strict order — generalized from
//! "one function-pointer table per state" to "one observer/filter list per
//! named channel".

use log::error;

use crate::error::DatapipeError;

/// Whether a publish should update the channel's cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Update the cache with the (possibly filtered) value, if the
    /// channel is not read-only.
    Cache,
    /// Run filters and observers but never touch the cache.
    NoCache,
}

/// Where a publish originated — purely a diagnostic tag threaded through
/// to observers, per §4.1's "source-policy" publish parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePolicy {
    /// Triggered by an external event (IPC, evdev, sysfs poll).
    External,
    /// Triggered internally by another subsystem's reaction.
    Internal,
}

/// A single named channel carrying the canonical value of one state
/// variable.
///
/// Invariants upheld here (§3.1):
/// - at most one in-flight publish at a time (detected via `dispatching`);
/// - filters run in attachment order and are pure from the channel's point
///   of view — a filter that returns `Err` is treated as identity (§4.1);
/// - a read-only channel never updates its cache, regardless of the
///   request.
pub struct Channel<T: Clone> {
    name: &'static str,
    cached: Option<T>,
    read_only: bool,
    dispatching: bool,
    filters: Vec<(&'static str, Box<dyn FnMut(T) -> Result<T, ()>>)>,
    input_observers: Vec<(&'static str, Box<dyn FnMut(&T, SourcePolicy)>)>,
    output_observers: Vec<(&'static str, Box<dyn FnMut(&T, SourcePolicy)>)>,
}

impl<T: Clone> Channel<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            cached: None,
            read_only: false,
            dispatching: false,
            filters: Vec::new(),
            input_observers: Vec::new(),
            output_observers: Vec::new(),
        }
    }

    /// Construct a read-only channel seeded with an initial value.
    pub fn new_read_only(name: &'static str, initial: T) -> Self {
        Self {
            cached: Some(initial),
            read_only: true,
            ..Self::new(name)
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The last cached value, if any has ever been published.
    pub fn get(&self) -> Option<&T> {
        self.cached.as_ref()
    }

    /// Seed the cache without running the publish pipeline (used at
    /// process init to give a channel its first value before any
    /// subscriber has attached).
    pub fn seed(&mut self, value: T) {
        self.cached = Some(value);
    }

    pub fn attach_filter(
        &mut self,
        module: &'static str,
        f: impl FnMut(T) -> Result<T, ()> + 'static,
    ) {
        self.filters.push((module, Box::new(f)));
    }

    pub fn attach_input_trigger(
        &mut self,
        module: &'static str,
        f: impl FnMut(&T, SourcePolicy) + 'static,
    ) {
        self.input_observers.push((module, Box::new(f)));
    }

    pub fn attach_output_trigger(
        &mut self,
        module: &'static str,
        f: impl FnMut(&T, SourcePolicy) + 'static,
    ) {
        self.output_observers.push((module, Box::new(f)));
    }

    pub fn detach_filter(&mut self, module: &'static str) {
        self.filters.retain(|(m, _)| *m != module);
    }

    pub fn detach_input_trigger(&mut self, module: &'static str) {
        self.input_observers.retain(|(m, _)| *m != module);
    }

    pub fn detach_output_trigger(&mut self, module: &'static str) {
        self.output_observers.retain(|(m, _)| *m != module);
    }

    /// Publish `value` through the pipeline (§4.1):
    /// input-triggers → filters (in order) → cache update → output-triggers.
    ///
    /// Returns the final (possibly filtered) value. Returns
    /// [`DatapipeError::Reentrant`] if called while this channel is
    /// already dispatching a publish, and
    /// [`DatapipeError::ReadOnly`] if `cache == Cache` on a read-only
    /// channel whose value would actually change (read-only channels may
    /// still be "published" to re-run triggers without mutating state,
    /// e.g. to re-broadcast the current value).
    pub fn publish(
        &mut self,
        value: T,
        source: SourcePolicy,
        cache: CachePolicy,
    ) -> Result<T, DatapipeError> {
        if self.dispatching {
            error!("datapipe '{}': re-entrant publish rejected", self.name);
            return Err(DatapipeError::Reentrant(self.name));
        }
        self.dispatching = true;

        for (_, obs) in self.input_observers.iter_mut() {
            obs(&value, source);
        }

        let mut v = value;
        for (module, filter) in self.filters.iter_mut() {
            v = match filter(v.clone()) {
                Ok(filtered) => filtered,
                Err(()) => {
                    error!(
                        "datapipe '{}': filter '{}' errored, treating as identity",
                        self.name, module
                    );
                    v
                }
            };
        }

        if cache == CachePolicy::Cache {
            if self.read_only {
                if self.cached.is_none() {
                    // First seed of a read-only channel is allowed.
                    self.cached = Some(v.clone());
                } else {
                    self.dispatching = false;
                    return Err(DatapipeError::ReadOnly(self.name));
                }
            } else {
                self.cached = Some(v.clone());
            }
        }

        for (_, obs) in self.output_observers.iter_mut() {
            obs(&v, source);
        }

        self.dispatching = false;
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_runs_filters_in_order_then_caches() {
        let mut ch = Channel::new("test");
        ch.attach_filter("a", |v: i32| Ok(v + 1));
        ch.attach_filter("b", |v: i32| Ok(v * 2));
        let out = ch
            .publish(3, SourcePolicy::External, CachePolicy::Cache)
            .unwrap();
        assert_eq!(out, 8); // (3+1)*2
        assert_eq!(*ch.get().unwrap(), 8);
    }

    #[test]
    fn filter_error_is_treated_as_identity() {
        let mut ch = Channel::new("test");
        ch.attach_filter("broken", |_v: i32| Err(()));
        let out = ch
            .publish(5, SourcePolicy::External, CachePolicy::Cache)
            .unwrap();
        assert_eq!(out, 5);
    }

    #[test]
    fn reentrant_publish_is_rejected() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let ch = Rc::new(RefCell::new(Channel::<i32>::new("reentrant")));
        let ch2 = ch.clone();
        ch.borrow_mut()
            .attach_output_trigger("reenter", move |_v, _s| {
                let res = ch2
                    .borrow_mut()
                    .publish(99, SourcePolicy::Internal, CachePolicy::Cache);
                assert!(matches!(res, Err(DatapipeError::Reentrant(_))));
            });
        ch.borrow_mut()
            .publish(1, SourcePolicy::External, CachePolicy::Cache)
            .unwrap();
    }

    #[test]
    fn read_only_channel_rejects_mutation_after_seed() {
        let mut ch = Channel::new_read_only("ro", 1);
        let res = ch.publish(2, SourcePolicy::External, CachePolicy::Cache);
        assert!(matches!(res, Err(DatapipeError::ReadOnly(_))));
        assert_eq!(*ch.get().unwrap(), 1);
    }

    #[test]
    fn no_cache_publish_leaves_cached_value_untouched() {
        let mut ch = Channel::new("test");
        ch.seed(10);
        ch.publish(20, SourcePolicy::External, CachePolicy::NoCache)
            .unwrap();
        assert_eq!(*ch.get().unwrap(), 10);
    }
}
