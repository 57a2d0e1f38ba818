//! Power limiting by supply voltage.

/// Calculate the maximum PWM output for a configured power limit.
///
/// The available heater power is `V² / R`, from the supply voltage and the heater impedance (both in tenths).
/// If the configured power is at or above what the supply can deliver, the whole period is available. Otherwise,
/// the PWM is limited proportionally, but never to less than a single tick.
pub fn pwm_limit(supply_voltage_x10: u16, impedance_x10: u16, power_w: u16, pwm_period: u16) -> u16 {
    let full_period = pwm_period as u32 + 1;

    // (Vx10 * Vx10) / 10 = V² * 10, this keeps one decimal for the division by the impedance (x10).
    let voltage_squared_x10 = ((supply_voltage_x10 as u32).pow(2) / 10).max(1);
    let max_power_w = voltage_squared_x10 / impedance_x10.max(1) as u32;

    let pwm_max = if power_w as u32 >= max_power_w {
        full_period
    } else {
        (full_period * power_w as u32 / max_power_w).clamp(1, full_period)
    };

    pwm_max.min(u16::MAX as u32) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_supply_allows_full_period() {
        // 12.0 V into 8.0 Ω can deliver 18 W, less than the configured 60 W.
        assert_eq!(pwm_limit(120, 80, 60, 1000), 1001);
    }

    #[test]
    fn strong_supply_is_limited() {
        // 24.0 V into 8.0 Ω can deliver 72 W.
        assert_eq!(pwm_limit(240, 80, 60, 1000), 1001 * 60 / 72);
    }

    #[test]
    fn never_fully_disabled() {
        assert_eq!(pwm_limit(240, 80, 0, 1000), 1);
        assert_eq!(pwm_limit(240, 80, 1, 10), 1);
    }

    #[test]
    fn zero_voltage_reading() {
        // Clamped to a minimum of 1, so the power limit is always "above" what is available.
        assert_eq!(pwm_limit(0, 80, 60, 1000), 1001);
        assert_eq!(pwm_limit(0, 0, 0, 1000), 1);
    }

    #[test]
    fn never_above_full_period() {
        for voltage_x10 in [0, 50, 120, 190, 240, 330, 500] {
            for power_w in [0, 1, 20, 60, 150] {
                let pwm_max = pwm_limit(voltage_x10, 62, power_w, 39_999);
                assert!(pwm_max >= 1);
                assert!(pwm_max <= 40_000);
            }
        }
    }
}
