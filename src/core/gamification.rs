//! Borrower gamification
//!
//! Points for applying and repaying, on-time streaks and milestone badges.
//! Badges are append-only: never removed, never duplicated.

use crate::models::{Badge, GamificationState, RepaymentStatus};

pub const APPLICATION_POINTS: u32 = 50;
pub const REPAYMENT_POINTS: u32 = 50;

/// Streak milestones: (streak, badge, bonus points)
pub const STREAK_MILESTONES: [(u32, Badge, u32); 2] = [
    (3, Badge::ConsistentPayer, 100),
    (5, Badge::ReliableBorrower, 200),
];

/// Result of applying one repayment
#[derive(Debug, Clone, PartialEq)]
pub struct RepaymentOutcome {
    pub state: GamificationState,
    /// Points added by this repayment, bonuses included
    pub points_awarded: u32,
    pub new_badges: Vec<Badge>,
}

/// Adds the badge unless already held; returns whether it was new
pub fn award_badge(state: &mut GamificationState, badge: Badge) -> bool {
    if state.has_badge(badge) {
        return false;
    }
    state.badges.push(badge.name().to_string());
    true
}

/// Points and badges for submitting an application
pub fn apply_application(
    mut state: GamificationState,
    first_application: bool,
) -> (GamificationState, Vec<Badge>) {
    state.points_earned = state.points_earned.saturating_add(APPLICATION_POINTS);
    let mut new_badges = Vec::new();
    if first_application && award_badge(&mut state, Badge::FirstApplication) {
        new_badges.push(Badge::FirstApplication);
    }
    (state, new_badges)
}

pub fn apply_repayment(mut state: GamificationState, status: RepaymentStatus) -> RepaymentOutcome {
    let mut points_awarded = 0;
    let mut new_badges = Vec::new();

    match status {
        RepaymentStatus::OnTime => {
            state.repayment_streak += 1;
            points_awarded += REPAYMENT_POINTS;
        }
        RepaymentStatus::Late => state.repayment_streak = 0,
    }

    for (streak, badge, bonus) in STREAK_MILESTONES {
        if state.repayment_streak == streak && award_badge(&mut state, badge) {
            points_awarded += bonus;
            new_badges.push(badge);
        }
    }

    state.points_earned = state.points_earned.saturating_add(points_awarded);
    RepaymentOutcome {
        state,
        points_awarded,
        new_badges,
    }
}

pub fn repayment_message(outcome: &RepaymentOutcome, status: RepaymentStatus) -> String {
    match status {
        RepaymentStatus::Late => "Repayment recorded.".to_string(),
        RepaymentStatus::OnTime => {
            let mut message = format!(
                "Repayment recorded! You earned {} points.",
                outcome.points_awarded
            );
            for badge in &outcome.new_badges {
                message.push_str(&format!(" New badge: {}.", badge));
            }
            message
        }
    }
}
