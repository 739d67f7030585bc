//! In-flight admission reservations
//!
//! An admitted launch holds a reservation for its user until provisioning
//! finishes. Reservations are taken only for launches that passed the rule
//! table, and the limit is re-checked under the user's entry lock, so two
//! concurrent launches cannot both take the last slot. A reservation whose
//! Deployment is already visible in the cluster is not counted a second
//! time. Reservations are local to this process.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::count::RunningJobs;

/// Invocation id to number of holders
type UserReservations = BTreeMap<String, usize>;

fn pending_in(reservations: &UserReservations, running: &RunningJobs) -> usize {
    reservations
        .iter()
        .filter(|(invocation, _)| !running.contains(invocation))
        .map(|(_, holders)| *holders)
        .sum()
}

/// Per-user admitted launches that are still provisioning
#[derive(Clone, Debug, Default)]
pub struct ReservationTable {
    in_flight: Arc<DashMap<String, UserReservations>>,
}

impl ReservationTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Admitted launches for `user` whose Deployment is not in `running` yet
    pub fn pending(&self, user: &str, running: &RunningJobs) -> usize {
        self.in_flight
            .get(user)
            .map(|r| pending_in(&r, running))
            .unwrap_or(0)
    }

    /// Reserve a slot for `invocation` if `user` is still under `limit`
    ///
    /// On refusal returns the job count that reached the limit.
    pub fn try_reserve(
        &self,
        user: &str,
        invocation: &str,
        running: &RunningJobs,
        limit: i32,
    ) -> Result<Reservation, usize> {
        {
            let mut reservations = self.in_flight.entry(user.to_string()).or_default();
            let job_count = running.count() + pending_in(&reservations, running);
            if job_count as i64 >= i64::from(limit) {
                drop(reservations);
                self.in_flight.remove_if(user, |_, r| r.is_empty());
                trace!(user, invocation, job_count, limit, "reservation refused");
                return Err(job_count);
            }
            *reservations.entry(invocation.to_string()).or_insert(0) += 1;
            trace!(user, invocation, job_count, "reservation taken");
        }
        Ok(Reservation {
            table: Arc::clone(&self.in_flight),
            user: user.to_string(),
            invocation: invocation.to_string(),
        })
    }

    /// Reservations currently held for `user`
    pub fn in_flight(&self, user: &str) -> usize {
        self.in_flight
            .get(user)
            .map(|r| r.values().sum())
            .unwrap_or(0)
    }
}

/// A held reservation
#[derive(Debug)]
pub struct Reservation {
    table: Arc<DashMap<String, UserReservations>>,
    user: String,
    invocation: String,
}

impl Reservation {
    /// User the reservation is for
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Invocation the reservation is for
    pub fn invocation(&self) -> &str {
        &self.invocation
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let now_empty = match self.table.get_mut(&self.user) {
            Some(mut reservations) => {
                if let Some(holders) = reservations.get_mut(&self.invocation) {
                    *holders = holders.saturating_sub(1);
                    if *holders == 0 {
                        reservations.remove(&self.invocation);
                    }
                }
                reservations.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.table.remove_if(&self.user, |_, r| r.is_empty());
        }
        trace!(user = %self.user, invocation = %self.invocation, "reservation released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(invocations: &[&str]) -> RunningJobs {
        RunningJobs::from_invocations(invocations.iter().copied())
    }

    #[test]
    fn last_slot_goes_to_one_launch() {
        let table = ReservationTable::new();
        let none = running(&[]);

        let first = table.try_reserve("ipcdev", "a", &none, 1).unwrap();
        // Same stale snapshot: the limit check still sees the first launch.
        assert_eq!(table.try_reserve("ipcdev", "b", &none, 1).unwrap_err(), 1);
        assert_eq!(table.in_flight("ipcdev"), 1);

        drop(first);
        assert_eq!(table.in_flight("ipcdev"), 0);
        assert!(table.try_reserve("ipcdev", "b", &none, 1).is_ok());
    }

    #[test]
    fn visible_deployment_is_not_counted_twice() {
        let table = ReservationTable::new();
        let _a = table.try_reserve("ipcdev", "a", &running(&[]), 2).unwrap();

        // "a" now shows up as a running Deployment.
        let now = running(&["a"]);
        assert_eq!(table.pending("ipcdev", &now), 0);
        assert!(table.try_reserve("ipcdev", "b", &now, 2).is_ok());
        assert_eq!(table.try_reserve("ipcdev", "c", &now, 2).unwrap_err(), 2);
    }

    #[test]
    fn refusal_leaves_no_entry() {
        let table = ReservationTable::new();
        assert!(table.try_reserve("ipcdev", "a", &running(&[]), 0).is_err());
        assert_eq!(table.in_flight("ipcdev"), 0);
        assert!(table.in_flight.get("ipcdev").is_none());
    }

    #[test]
    fn users_are_independent() {
        let table = ReservationTable::new();
        let none = running(&[]);
        let _a = table.try_reserve("ipcdev", "a", &none, 1).unwrap();
        assert!(table.try_reserve("someone-else", "b", &none, 1).is_ok());
        assert_eq!(table.pending("ipcdev", &none), 1);
    }

    #[test]
    fn repeated_invocation_needs_every_holder_released() {
        let table = ReservationTable::new();
        let none = running(&[]);
        let first = table.try_reserve("ipcdev", "a", &none, 5).unwrap();
        let second = table.try_reserve("ipcdev", "a", &none, 5).unwrap();
        assert_eq!(table.in_flight("ipcdev"), 2);
        drop(first);
        assert_eq!(table.in_flight("ipcdev"), 1);
        assert_eq!(second.invocation(), "a");
        drop(second);
        assert_eq!(table.in_flight("ipcdev"), 0);
    }

    #[test]
    fn concurrent_reservations_never_exceed_limit() {
        let table = ReservationTable::new();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let table = table.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let none = RunningJobs::default();
                        if let Ok(r) = table.try_reserve("ipcdev", &format!("{t}-{i}"), &none, 3) {
                            assert!(table.in_flight("ipcdev") <= 3);
                            drop(r);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(table.in_flight("ipcdev"), 0);
    }
}
