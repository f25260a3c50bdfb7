use super::state::{Phase, SessionState};

/// `MM:SS`, seconds rounded up so `00:00` only shows at the boundary.
pub fn format_remaining(remaining_ms: u64) -> String {
    let total_secs = remaining_ms.div_ceil(1000);
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

pub fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Active => "Active",
        Phase::Rest => "Rest",
    }
}

pub fn cycle_info(state: &SessionState) -> String {
    match state.settings.repeat_count.limit() {
        Some(limit) => format!("{}/{} cycles", state.completed_cycles, limit),
        None => format!("{} cycles", state.completed_cycles),
    }
}

/// 0.0 .. 1.0 progress within the current phase.
pub fn phase_progress(state: &SessionState) -> f64 {
    let total = state.phase_duration_ms();
    if total == 0 {
        return 0.0;
    }
    (1.0 - state.remaining_ms as f64 / total as f64).clamp(0.0, 1.0)
}

/// One-line summary used by text surfaces.
pub fn status_line(state: &SessionState) -> String {
    format!(
        "[{}] {} {:?} · {}",
        phase_label(state.phase),
        format_remaining(state.remaining_ms),
        state.status,
        cycle_info(state)
    )
}
