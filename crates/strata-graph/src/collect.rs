//! Cycle-breaking release.
//!
//! Reference counting alone never frees a cycle: each member keeps the next
//! one alive. When the outermost handle release runs, the collector scans
//! the subgraph reachable from the released object with an ordinary
//! serialization pass against a discarding context, then destroys every
//! scanned object that is neither reachable from the heap root nor held by
//! a handle outside the scanned subgraph.
//!
//! An object counts as held from outside when its reference count exceeds
//! the number of handles the scan found pointing at it. Everything reachable
//! from a held object is kept as well.
//!
//! Releases that happen while a collection runs take the plain path:
//! decrement, and destroy at zero. One release therefore costs at most one
//! scan, however many objects it ends up destroying.
//!
//! A scan cannot look inside an object that is mutably borrowed, which is
//! the normal state of a parent while one of its handle fields is being
//! overwritten. Such a release falls back to the plain path and the object
//! is queued; the queue is retried when the borrow guard returned by
//! [`Handle::borrow_mut`](crate::Handle::borrow_mut) is dropped.

use std::collections::HashSet;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::context::Context;
use crate::error::GraphResult;
use crate::heap::{self, CollectGuard, Slot};
use crate::object::Object;
use crate::protocol;

/// Release one handle's reference to `slot`.
pub(crate) fn release(slot: &Rc<Slot>) {
    if !slot.is_alive() || slot.refs.get() == 0 {
        return;
    }
    let nested = heap::is_collecting().unwrap_or(true);
    if nested || !heap::config().collect_cycles {
        plain_release(slot);
        return;
    }

    let _guard = CollectGuard::enter();
    match collect_from(slot, true) {
        Ok(0) => {}
        Ok(destroyed) => debug!(id = %slot.id(), destroyed, "released unreachable subgraph"),
        Err(err) => {
            debug!(id = %slot.id(), %err, "cycle scan deferred");
            plain_release(slot);
            if slot.is_alive() {
                heap::defer(slot);
            }
            return;
        }
    }
    if slot.is_alive() {
        plain_release(slot);
    }
}

/// Retry the releases whose scan was blocked by a borrow.
pub(crate) fn collect_pending() {
    if heap::is_collecting() != Some(false) || !heap::has_pending() {
        return;
    }
    let _guard = CollectGuard::enter();
    for slot in heap::take_pending() {
        match collect_from(&slot, false) {
            Ok(0) => {}
            Ok(destroyed) => debug!(id = %slot.id(), destroyed, "deferred release collected"),
            Err(_) => heap::defer(&slot),
        }
    }
}

/// Decrement, and destroy at zero.
fn plain_release(slot: &Rc<Slot>) {
    let refs = slot.refs.get();
    if !slot.is_alive() || refs == 0 {
        return;
    }
    slot.refs.set(refs - 1);
    if refs == 1 {
        slot.alive.set(false);
        let value = take_value(slot);
        heap::forget(slot);
        trace!(id = %slot.id(), class = slot.class_name, "object destroyed");
        drop(value);
    }
}

/// Scan from `start` and destroy what is unreachable. With `releasing`, one
/// of `start`'s references belongs to the handle being released.
fn collect_from(start: &Rc<Slot>, releasing: bool) -> GraphResult<usize> {
    let mut scan = Context::scanning();
    protocol::write_object(&mut scan, start)?;

    let mut held = Vec::new();
    if let Some(root) = heap::root_slot().filter(|root| !Rc::ptr_eq(root, start)) {
        let mut rooted = Context::scanning();
        protocol::write_object(&mut rooted, &root)?;
        held.extend(
            rooted
                .visited()
                .keys()
                .filter(|key| scan.visited().contains_key(key)),
        );
    }

    let start_key = Slot::key(start);
    for (&key, slot) in scan.visited() {
        let own = usize::from(releasing && key == start_key);
        let external = slot
            .refs
            .get()
            .saturating_sub(scan.encounters(key))
            .saturating_sub(own);
        if external > 0 {
            held.push(key);
        }
    }

    Ok(destroy_all(unreachable(scan, held)))
}

/// Run a collection over every resident object on this thread.
///
/// Destroys every object that is neither reachable from the root nor from an
/// object held by a handle outside the heap's own object fields. Useful with
/// [`HeapConfig::collect_cycles`](crate::HeapConfig::collect_cycles) turned
/// off. Returns the number of objects destroyed; does nothing if called from
/// inside a collection or a load.
pub fn collect_garbage() -> usize {
    if heap::is_collecting() != Some(false) {
        return 0;
    }
    let _guard = CollectGuard::enter();

    let mut scan = Context::scanning();
    for slot in heap::live_slots() {
        if let Err(err) = protocol::write_object(&mut scan, &slot) {
            debug!(%err, "garbage collection aborted");
            return 0;
        }
    }

    let mut held: Vec<usize> = heap::root_slot().iter().map(Slot::key).collect();
    for (&key, slot) in scan.visited() {
        if slot.refs.get() > scan.encounters(key) {
            held.push(key);
        }
    }

    drop(heap::take_pending());
    let destroyed = destroy_all(unreachable(scan, held));
    debug!(destroyed, "garbage collected");
    destroyed
}

/// Destroy the objects a failed load constructed.
///
/// Nothing outside the load can hold them, so they go regardless of their
/// reference counts. Handles they hold to objects that were already resident
/// are released the plain way. Returns the number destroyed.
pub(crate) fn discard(created: Vec<Rc<Slot>>) -> usize {
    let doomed: Vec<_> = created.into_iter().filter(|slot| slot.is_alive()).collect();
    if doomed.is_empty() {
        return 0;
    }
    let _guard = CollectGuard::enter();
    destroy_all(doomed)
}

/// The scanned objects not reachable from any of `held`.
fn unreachable(scan: Context<'_>, held: Vec<usize>) -> Vec<Rc<Slot>> {
    let mut keep = HashSet::new();
    let mut stack = held;
    while let Some(key) = stack.pop() {
        if keep.insert(key) {
            stack.extend_from_slice(scan.edges(key));
        }
    }
    let mut doomed: Vec<_> = scan
        .into_visited()
        .into_iter()
        .filter(|(key, _)| !keep.contains(key))
        .map(|(_, slot)| slot)
        .collect();
    doomed.sort_by_key(|slot| slot.id());
    doomed
}

/// Destroy every slot in `doomed` at once.
///
/// Reference counts are forced to zero first, so the releases triggered by
/// dropping the objects' own handle fields skip the doomed set.
fn destroy_all(doomed: Vec<Rc<Slot>>) -> usize {
    for slot in &doomed {
        slot.refs.set(0);
        slot.alive.set(false);
    }
    let mut values = Vec::with_capacity(doomed.len());
    for slot in &doomed {
        values.extend(take_value(slot));
        heap::forget(slot);
        trace!(id = %slot.id(), class = slot.class_name, "object destroyed");
    }
    drop(values);
    doomed.len()
}

fn take_value(slot: &Slot) -> Option<Box<dyn Object>> {
    match slot.value.try_borrow_mut() {
        Ok(mut value) => value.take(),
        Err(_) => {
            warn!(id = %slot.id(), "object borrowed while destroyed, fields leaked");
            None
        }
    }
}
