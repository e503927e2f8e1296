use serde::Serialize;

/// Cumulative study minutes needed to reach `level`.
///
/// Level 1 starts at 0, level 2 at 10, and each level past that costs a
/// little more than the one before: level 3 at 25, level 4 at 45, level 5
/// at 70.
pub fn minutes_for_level(level: u32) -> f64 {
    if level <= 1 {
        return 0.0;
    }
    if level == 2 {
        return 10.0;
    }
    // Each level past 2 costs 5 more minutes than the one before it
    // (15, 20, 25, ...); the closed form below is that sum.
    let level = level as f64;
    10.0 + 5.0 * ((level - 2.0) * (level + 3.0)) / 2.0
}

/// Largest level whose threshold is covered by `minutes`.
///
/// Linear scan upward; the curve grows fast enough that realistic totals
/// stay within a few dozen iterations.
pub fn level_for_minutes(minutes: f64) -> u32 {
    let mut level = 1;
    while minutes_for_level(level + 1) <= minutes {
        level += 1;
    }
    level
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelProgress {
    /// Minutes accumulated past the current level's threshold.
    pub current: f64,
    /// Minutes between the current threshold and the next one.
    pub required: f64,
    pub percent: f64,
}

/// Position within `level` for a total of `minutes`.
///
/// When `level` comes from [`level_for_minutes`] on the same total,
/// `percent` lands in `[0, 100]`.
pub fn progress_within_level(level: u32, minutes: f64) -> LevelProgress {
    let floor = minutes_for_level(level);
    let ceiling = minutes_for_level(level + 1);
    let current = minutes - floor;
    let required = ceiling - floor;
    let percent = if required > 0.0 {
        (current / required) * 100.0
    } else {
        100.0
    };

    LevelProgress {
        current,
        required,
        percent,
    }
}
