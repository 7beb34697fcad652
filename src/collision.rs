// src/collision.rs
//! Per-object collision bookkeeping.
//!
//! Every step the scene feeds engine contacts into each object's
//! [`CollisionTracker`]. The tracker keeps the colliding / ground / object flags
//! for the current step and, for subscribed objects, accumulates contacts until
//! the report interval allows delivery. After the last collision ends, exactly
//! one empty report goes out; then the object stops being reported.

use glam::Vec3;

use crate::engine::TERRAIN_ID;
use crate::object::LocalId;

/// Normals steeper than this count as standing on something.
pub const GROUND_NORMAL_Z: f32 = 0.7;

/// A contact as seen from one object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactInfo {
    pub other: LocalId,
    pub point: Vec3,
    /// Points from this object toward `other`.
    pub normal: Vec3,
    pub depth: f32,
}

impl ContactInfo {
    /// Contact with the terrain, or with something underneath.
    #[inline]
    pub fn is_ground(&self) -> bool {
        self.other == TERRAIN_ID || self.normal.z < -GROUND_NORMAL_Z
    }
}

/// Result of offering the pending contacts for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    /// Report to deliver now (empty means "collisions ended").
    pub report: Option<Vec<ContactInfo>>,
    /// Whether the object must stay in the reporting set.
    pub keep_reporting: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CollisionTracker {
    interval_ms: Option<u32>,
    next_report_ms: u64,
    pending: Vec<ContactInfo>,
    last_report_len: usize,
    colliding_step: Option<u64>,
    ground_step: Option<u64>,
    object_step: Option<u64>,
}

impl CollisionTracker {
    pub fn subscribe(&mut self, interval_ms: u32) {
        self.interval_ms = Some(interval_ms);
    }

    pub fn unsubscribe(&mut self) {
        self.interval_ms = None;
        self.pending.clear();
        self.last_report_len = 0;
    }

    #[inline]
    pub fn is_subscribed(&self) -> bool {
        self.interval_ms.is_some()
    }

    /// Record one contact for `step`. Returns `true` when the contact was
    /// queued for reporting.
    pub fn record(&mut self, step: u64, contact: ContactInfo) -> bool {
        self.colliding_step = Some(step);
        if contact.is_ground() {
            self.ground_step = Some(step);
        }
        if contact.other != TERRAIN_ID {
            self.object_step = Some(step);
        }

        if !self.is_subscribed() {
            return false;
        }
        // One entry per partner, keep the deepest.
        match self.pending.iter_mut().find(|c| c.other == contact.other) {
            Some(existing) if existing.depth < contact.depth => *existing = contact,
            Some(_) => {}
            None => self.pending.push(contact),
        }
        true
    }

    /// `(colliding, ground, object)` for `step`.
    pub fn flags(&self, step: u64) -> (bool, bool, bool) {
        (
            self.colliding_step == Some(step),
            self.ground_step == Some(step),
            self.object_step == Some(step),
        )
    }

    pub fn pending(&self) -> &[ContactInfo] {
        &self.pending
    }

    /// Offer accumulated contacts for delivery at `now_ms`, the time of `step`.
    pub fn send(&mut self, now_ms: u64, step: u64) -> SendOutcome {
        let Some(interval) = self.interval_ms else {
            return SendOutcome {
                report: None,
                keep_reporting: false,
            };
        };

        // Contacts held by the throttle are stale once the collision is over;
        // the end report replaces them.
        let ended = self.colliding_step != Some(step);
        if ended && self.last_report_len != 0 && now_ms < self.next_report_ms {
            self.pending.clear();
        }

        let force = self.pending.is_empty() && self.last_report_len != 0;
        if self.pending.is_empty() && !force {
            // End already reported.
            return SendOutcome {
                report: None,
                keep_reporting: false,
            };
        }
        if !force && now_ms < self.next_report_ms {
            return SendOutcome {
                report: None,
                keep_reporting: true,
            };
        }

        self.next_report_ms = now_ms + u64::from(interval);
        let contacts = std::mem::take(&mut self.pending);
        self.last_report_len = contacts.len();
        let keep_reporting = !contacts.is_empty();
        SendOutcome {
            report: Some(contacts),
            keep_reporting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(other: LocalId) -> ContactInfo {
        ContactInfo {
            other,
            point: Vec3::ZERO,
            normal: Vec3::X,
            depth: 0.01,
        }
    }

    #[test]
    fn exactly_one_empty_report_after_collisions_end() {
        let mut tracker = CollisionTracker::default();
        tracker.subscribe(0);

        let mut reports = Vec::new();
        for (step, now) in [(1u64, 0u64), (2, 20), (3, 40)] {
            assert!(tracker.record(step, contact(5)));
            reports.push(tracker.send(now, step));
        }
        assert!(reports.iter().all(|r| r.report.as_ref().map(Vec::len) == Some(1) && r.keep_reporting));

        let end = tracker.send(60, 4);
        assert_eq!(end.report, Some(Vec::new()));
        assert!(!end.keep_reporting);

        let after = tracker.send(80, 5);
        assert_eq!(after.report, None);
    }

    #[test]
    fn throttled_contacts_wait_for_the_interval() {
        let mut tracker = CollisionTracker::default();
        tracker.subscribe(100);
        tracker.record(1, contact(5));
        assert!(tracker.send(0, 1).report.is_some());

        tracker.record(2, contact(5));
        let held = tracker.send(50, 2);
        assert_eq!(held.report, None);
        assert!(held.keep_reporting);

        tracker.record(3, contact(5));
        let later = tracker.send(100, 3);
        assert_eq!(later.report.map(|r| r.len()), Some(1));
    }

    #[test]
    fn collision_end_is_not_delayed_by_the_interval() {
        let mut tracker = CollisionTracker::default();
        tracker.subscribe(100);
        tracker.record(1, contact(5));
        assert_eq!(tracker.send(0, 1).report.map(|r| r.len()), Some(1));

        tracker.record(2, contact(5));
        assert_eq!(tracker.send(20, 2).report, None);

        // Nothing touched at step 3: the held contact is dropped and the end
        // goes out right away.
        let end = tracker.send(40, 3);
        assert_eq!(end.report, Some(Vec::new()));
        assert!(!end.keep_reporting);
        assert!(tracker.pending().is_empty());
        assert_eq!(tracker.send(120, 4).report, None);
    }

    #[test]
    fn a_brief_first_contact_still_gets_reported() {
        let mut tracker = CollisionTracker::default();
        tracker.subscribe(100);
        tracker.record(1, contact(5));
        tracker.send(0, 1);
        tracker.send(20, 2);
        // Second collision starts and ends inside the same interval after the
        // first ended.
        tracker.record(3, contact(6));
        assert_eq!(tracker.send(40, 3).report, None);
        let delivered = tracker.send(120, 4);
        assert_eq!(delivered.report.map(|r| r[0].other), Some(6));
    }

    #[test]
    fn duplicates_keep_the_deepest_contact() {
        let mut tracker = CollisionTracker::default();
        tracker.subscribe(0);
        tracker.record(1, contact(5));
        tracker.record(1, ContactInfo { depth: 0.5, ..contact(5) });
        tracker.record(1, contact(6));
        assert_eq!(tracker.pending().len(), 2);
        assert_eq!(tracker.pending()[0].depth, 0.5);
    }

    #[test]
    fn flags_track_ground_and_objects_per_step() {
        let mut tracker = CollisionTracker::default();
        assert!(!tracker.record(
            4,
            ContactInfo {
                other: TERRAIN_ID,
                point: Vec3::ZERO,
                normal: -Vec3::Z,
                depth: 0.0,
            }
        ));
        assert_eq!(tracker.flags(4), (true, true, false));
        tracker.record(5, ContactInfo { normal: -Vec3::Z, ..contact(8) });
        assert_eq!(tracker.flags(5), (true, true, true));
        assert_eq!(tracker.flags(6), (false, false, false));
    }
}
