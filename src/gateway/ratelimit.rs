//! Per-conversation rate limit ledger.
//!
//! One instance is shared (via `Arc`) by the poller and the outbound gate.
//! All state sits behind a single mutex, so a check-and-record through
//! [`RateLimitLedger::try_acquire`] is atomic per conversation.
//!
//! Two clocks feed the ledger: intake evaluates rows at their store
//! timestamp, unsolicited sends at the process clock. Recorded times never
//! move backwards and a time earlier than the last response counts as zero
//! elapsed, so skew between the two delays a response by at most one cooldown.

use chrono::{DateTime, Local, NaiveDate, Utc};
use parley_core::{
    config::RateLimitConfig,
    message::{MessageClass, Privilege},
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Throttling state for one conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationLimits {
    pub last_response_at: Option<DateTime<Utc>>,
    pub daily_count: u32,
    pub last_command_at: Option<DateTime<Utc>>,
}

/// Why a response was allowed or refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Admin conversation; never throttled.
    Exempt,
    Allowed,
    DailyCapReached,
    /// Still inside a cooldown window; `remaining_ms` until it opens.
    Cooldown { remaining_ms: i64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Exempt | Self::Allowed)
    }
}

#[derive(Default)]
struct LedgerState {
    conversations: HashMap<String, ConversationLimits>,
    /// Local calendar day the counts belong to. Shared by all conversations.
    current_day: Option<NaiveDate>,
}

/// Rate limit ledger keyed by conversation id.
pub struct RateLimitLedger {
    config: RateLimitConfig,
    state: Mutex<LedgerState>,
}

impl RateLimitLedger {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        // Poisoning is ignored: every update leaves the maps consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reset every conversation's daily count when the local day changes.
    ///
    /// Returns `true` when a new day began (including the very first call).
    /// Timestamps from an earlier day than the tracked one are ignored.
    pub fn roll_day(&self, now: DateTime<Utc>) -> bool {
        Self::roll_day_locked(&mut self.lock(), now)
    }

    fn roll_day_locked(state: &mut LedgerState, now: DateTime<Utc>) -> bool {
        let today = now.with_timezone(&Local).date_naive();
        match state.current_day {
            Some(day) if day >= today => false,
            previous => {
                if previous.is_some() {
                    for limits in state.conversations.values_mut() {
                        limits.daily_count = 0;
                    }
                    tracing::info!("rate limit: new day {today}, daily counts reset");
                }
                state.current_day = Some(today);
                true
            }
        }
    }

    /// Decide whether `conversation` may receive a response of `class` at `now`.
    pub fn check(
        &self,
        conversation: &str,
        privilege: Privilege,
        class: MessageClass,
        now: DateTime<Utc>,
    ) -> RateDecision {
        if privilege.is_admin() {
            return RateDecision::Exempt;
        }
        let mut state = self.lock();
        Self::roll_day_locked(&mut state, now);
        let limits = state
            .conversations
            .get(conversation)
            .cloned()
            .unwrap_or_default();
        self.decide(&limits, class, now)
    }

    /// Boolean form of [`check`](Self::check).
    pub fn can_respond(
        &self,
        conversation: &str,
        privilege: Privilege,
        class: MessageClass,
        now: DateTime<Utc>,
    ) -> bool {
        self.check(conversation, privilege, class, now).is_allowed()
    }

    /// Record a response that was actually sent (or accepted for emission).
    /// No-op for admins.
    pub fn record_response(
        &self,
        conversation: &str,
        privilege: Privilege,
        class: MessageClass,
        now: DateTime<Utc>,
    ) {
        if privilege.is_admin() {
            return;
        }
        let mut state = self.lock();
        Self::roll_day_locked(&mut state, now);
        Self::record_locked(&mut state, conversation, class, now);
    }

    /// Check and, when allowed, record under one lock.
    pub fn try_acquire(
        &self,
        conversation: &str,
        privilege: Privilege,
        class: MessageClass,
        now: DateTime<Utc>,
    ) -> RateDecision {
        if privilege.is_admin() {
            return RateDecision::Exempt;
        }
        let mut state = self.lock();
        Self::roll_day_locked(&mut state, now);
        let limits = state
            .conversations
            .get(conversation)
            .cloned()
            .unwrap_or_default();
        let decision = self.decide(&limits, class, now);
        if decision.is_allowed() {
            Self::record_locked(&mut state, conversation, class, now);
        }
        decision
    }

    /// Copy of a conversation's current state, if it was ever touched.
    pub fn snapshot(&self, conversation: &str) -> Option<ConversationLimits> {
        self.lock().conversations.get(conversation).cloned()
    }

    fn record_locked(
        state: &mut LedgerState,
        conversation: &str,
        class: MessageClass,
        now: DateTime<Utc>,
    ) {
        let limits = state
            .conversations
            .entry(conversation.to_string())
            .or_default();
        limits.last_response_at = Some(latest(limits.last_response_at, now));
        limits.daily_count = limits.daily_count.saturating_add(1);
        if class.is_command() {
            limits.last_command_at = Some(latest(limits.last_command_at, now));
        }
    }

    fn decide(
        &self,
        limits: &ConversationLimits,
        class: MessageClass,
        now: DateTime<Utc>,
    ) -> RateDecision {
        if limits.daily_count >= self.config.max_daily_responses {
            return RateDecision::DailyCapReached;
        }

        let (since, cooldown_ms) = match class {
            MessageClass::Command => (limits.last_command_at, self.config.command_cooldown_ms),
            MessageClass::Question => (limits.last_response_at, self.config.question_cooldown_ms),
            MessageClass::Chat if limits.daily_count < self.config.new_conversation_threshold => (
                limits.last_response_at,
                self.config.new_conversation_cooldown_ms,
            ),
            MessageClass::Chat => (
                limits.last_response_at,
                self.config.min_response_interval_ms,
            ),
        };

        let Some(last) = since else {
            return RateDecision::Allowed;
        };
        let cooldown = i64::try_from(cooldown_ms).unwrap_or(i64::MAX);
        let elapsed = now.signed_duration_since(last).num_milliseconds().max(0);
        if elapsed < cooldown {
            RateDecision::Cooldown {
                remaining_ms: cooldown.saturating_sub(elapsed),
            }
        } else {
            RateDecision::Allowed
        }
    }
}

fn latest(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    previous.map_or(now, |prev| prev.max(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    const CONV: &str = "5511999887766@c.us";

    fn ledger() -> RateLimitLedger {
        RateLimitLedger::new(RateLimitConfig {
            min_response_interval_ms: 20_000,
            max_daily_responses: 100,
            command_cooldown_ms: 5_000,
            question_cooldown_ms: 12_000,
            new_conversation_cooldown_ms: 3_000,
            new_conversation_threshold: 5,
        })
    }

    /// Local noon on a day with no DST transition nearby.
    fn t0() -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(2026, 6, 15, 12, 0, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    fn ms(n: i64) -> TimeDelta {
        TimeDelta::milliseconds(n)
    }

    fn send(l: &RateLimitLedger, class: MessageClass, at: DateTime<Utc>) -> bool {
        l.try_acquire(CONV, Privilege::Standard, class, at)
            .is_allowed()
    }

    #[test]
    fn test_command_cooldown() {
        for (gap, expected) in [(2_000, false), (4_999, false), (5_000, true), (6_000, true)] {
            let l = ledger();
            assert!(send(&l, MessageClass::Command, t0()));
            assert_eq!(
                send(&l, MessageClass::Command, t0() + ms(gap)),
                expected,
                "command gap {gap}ms"
            );
        }
    }

    #[test]
    fn test_new_conversation_relaxed_cooldown() {
        for (gap, expected) in [(2_000, false), (2_999, false), (3_000, true), (3_500, true)] {
            let l = ledger();
            assert!(send(&l, MessageClass::Chat, t0()));
            assert_eq!(l.snapshot(CONV).unwrap().daily_count, 1);
            assert_eq!(
                send(&l, MessageClass::Chat, t0() + ms(gap)),
                expected,
                "chat gap {gap}ms"
            );
        }
    }

    #[test]
    fn test_standard_cooldown_once_established() {
        let l = ledger();
        let mut at = t0();
        for _ in 0..5 {
            assert!(send(&l, MessageClass::Chat, at));
            at += ms(3_000);
        }
        assert_eq!(l.snapshot(CONV).unwrap().daily_count, 5);
        let last = at - ms(3_000);

        assert!(!send(&l, MessageClass::Chat, last + ms(3_000)));
        assert!(!send(&l, MessageClass::Chat, last + ms(19_999)));
        assert!(send(&l, MessageClass::Chat, last + ms(20_000)));
    }

    #[test]
    fn test_question_cooldown() {
        let l = ledger();
        assert!(send(&l, MessageClass::Chat, t0()));
        assert!(!send(&l, MessageClass::Question, t0() + ms(11_999)));
        assert!(send(&l, MessageClass::Question, t0() + ms(12_000)));
    }

    #[test]
    fn test_command_independent_of_chat_cooldown() {
        let l = ledger();
        for i in 0..5 {
            assert!(send(&l, MessageClass::Chat, t0() + ms(i * 3_000)));
        }
        // Right after a chat response the chat window is closed, commands are not.
        let after = t0() + ms(12_000 + 100);
        assert!(!send(&l, MessageClass::Chat, after));
        assert!(send(&l, MessageClass::Command, after));
        // Commands still count toward the general cooldown.
        assert_eq!(l.snapshot(CONV).unwrap().last_response_at, Some(after));
    }

    #[test]
    fn test_cooldown_reports_remaining() {
        let l = ledger();
        assert!(send(&l, MessageClass::Command, t0()));
        assert_eq!(
            l.check(CONV, Privilege::Standard, MessageClass::Command, t0() + ms(1_500)),
            RateDecision::Cooldown { remaining_ms: 3_500 }
        );
    }

    #[test]
    fn test_daily_cap() {
        let l = RateLimitLedger::new(RateLimitConfig {
            max_daily_responses: 3,
            ..ledger().config().clone()
        });
        for i in 0..3 {
            assert!(send(&l, MessageClass::Command, t0() + ms(i * 60_000)));
        }
        for hours in [1, 3, 6] {
            assert_eq!(
                l.check(
                    CONV,
                    Privilege::Standard,
                    MessageClass::Command,
                    t0() + TimeDelta::hours(hours)
                ),
                RateDecision::DailyCapReached
            );
        }
        // Next local day.
        assert!(send(&l, MessageClass::Command, t0() + TimeDelta::days(1)));
        assert_eq!(l.snapshot(CONV).unwrap().daily_count, 1);
    }

    #[test]
    fn test_roll_day_idempotent_within_day() {
        let l = ledger();
        assert!(l.roll_day(t0()));
        assert!(send(&l, MessageClass::Chat, t0()));
        assert!(send(&l, MessageClass::Chat, t0() + ms(3_000)));
        assert!(!l.roll_day(t0() + TimeDelta::minutes(1)));
        assert!(!l.roll_day(t0() + TimeDelta::hours(2)));
        assert_eq!(l.snapshot(CONV).unwrap().daily_count, 2);

        let tomorrow = t0() + TimeDelta::days(1);
        assert!(l.roll_day(tomorrow));
        assert!(!l.roll_day(tomorrow + TimeDelta::minutes(5)));
        assert_eq!(l.snapshot(CONV).unwrap().daily_count, 0);
    }

    #[test]
    fn test_roll_day_resets_all_conversations() {
        let l = ledger();
        for conv in ["a@c.us", "b@c.us", "c@c.us"] {
            l.record_response(conv, Privilege::Standard, MessageClass::Chat, t0());
        }
        l.roll_day(t0() + TimeDelta::days(1));
        for conv in ["a@c.us", "b@c.us", "c@c.us"] {
            let snap = l.snapshot(conv).unwrap();
            assert_eq!(snap.daily_count, 0);
            // Entries persist; only counts reset.
            assert_eq!(snap.last_response_at, Some(t0()));
        }
    }

    #[test]
    fn test_earlier_day_does_not_reset() {
        let l = ledger();
        l.record_response(CONV, Privilege::Standard, MessageClass::Chat, t0());
        assert!(!l.roll_day(t0() - TimeDelta::days(1)));
        assert_eq!(l.snapshot(CONV).unwrap().daily_count, 1);
    }

    #[test]
    fn test_admin_bypass() {
        let l = RateLimitLedger::new(RateLimitConfig {
            max_daily_responses: 1,
            ..ledger().config().clone()
        });
        l.record_response(CONV, Privilege::Standard, MessageClass::Chat, t0());
        let before = l.snapshot(CONV).unwrap();
        assert!(!l.can_respond(CONV, Privilege::Standard, MessageClass::Chat, t0() + ms(10)));

        for class in [MessageClass::Command, MessageClass::Question, MessageClass::Chat] {
            assert!(l.can_respond(CONV, Privilege::Admin, class, t0() + ms(10)));
            assert_eq!(
                l.try_acquire(CONV, Privilege::Admin, class, t0() + ms(10)),
                RateDecision::Exempt
            );
            l.record_response(CONV, Privilege::Admin, class, t0() + ms(20));
        }
        assert_eq!(l.snapshot(CONV).unwrap(), before);
        assert!(l.snapshot("other@c.us").is_none());
    }

    #[test]
    fn test_clock_skew_is_bounded_by_one_cooldown() {
        let l = ledger();
        // Intake recorded at a store time ahead of the process clock.
        assert!(send(&l, MessageClass::Command, t0() + ms(4_000)));
        assert_eq!(
            l.check(CONV, Privilege::Standard, MessageClass::Command, t0()),
            RateDecision::Cooldown { remaining_ms: 5_000 }
        );

        // A later record stamped earlier does not rewind the ledger.
        l.record_response(CONV, Privilege::Standard, MessageClass::Command, t0());
        let snap = l.snapshot(CONV).unwrap();
        assert_eq!(snap.last_response_at, Some(t0() + ms(4_000)));
        assert_eq!(snap.last_command_at, Some(t0() + ms(4_000)));
        assert_eq!(snap.daily_count, 2);
    }

    #[test]
    fn test_check_does_not_record() {
        let l = ledger();
        assert!(l.can_respond(CONV, Privilege::Standard, MessageClass::Chat, t0()));
        assert!(l.snapshot(CONV).is_none());
    }
}
