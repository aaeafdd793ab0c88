//! Time-of-use tariff calculation (C1).
//!
//! `compute_cost` is a pure function: given delivered energy and the
//! session's wall-clock interval, it returns the priced bill. The rate
//! table is external data (a [`TariffSchedule`]) rather than a hard-coded
//! match, the way the teacher's `PricingConfig`/`HdoCache` keep tariff
//! tables out of the decision code so they can be retuned without a
//! rebuild.

use crate::error::TariffDomainError;
use chrono::{DateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use ev_shared::Cents;
use serde::{Deserialize, Serialize};

/// A half-open `[start, end)` wall-clock band with a flat per-kWh rate.
/// Bands may wrap midnight (`start > end`), e.g. the default valley band
/// `23:00..07:00`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TariffBand {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub rate_per_kwh: f64,
}

impl TariffBand {
    fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            t >= self.start && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TariffSchedule {
    pub bands: Vec<TariffBand>,
    pub service_rate_per_kwh: f64,
}

impl Default for TariffSchedule {
    fn default() -> Self {
        let t = |h: u32| NaiveTime::from_hms_opt(h, 0, 0).expect("valid hour");
        Self {
            bands: vec![
                TariffBand {
                    start: t(10),
                    end: t(15),
                    rate_per_kwh: 1.00,
                },
                TariffBand {
                    start: t(18),
                    end: t(21),
                    rate_per_kwh: 1.00,
                },
                TariffBand {
                    start: t(7),
                    end: t(10),
                    rate_per_kwh: 0.70,
                },
                TariffBand {
                    start: t(15),
                    end: t(18),
                    rate_per_kwh: 0.70,
                },
                TariffBand {
                    start: t(21),
                    end: t(23),
                    rate_per_kwh: 0.70,
                },
                TariffBand {
                    start: t(23),
                    end: t(7),
                    rate_per_kwh: 0.40,
                },
            ],
            service_rate_per_kwh: 0.80,
        }
    }
}

/// The priced outcome of a session, per §3 Bill invariant 7: the two
/// components always sum, exactly, to the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TariffBill {
    pub energy_cost: Cents,
    pub service_cost: Cents,
}

impl TariffBill {
    #[must_use]
    pub fn total_cost(&self) -> Cents {
        self.energy_cost + self.service_cost
    }
}

impl TariffSchedule {
    /// Validates that the bands fully tile a 24h day with neither gaps nor
    /// overlaps, checked at config load time per the station's C9
    /// configuration layer — not at first billing use.
    pub fn validate(&self) -> Result<(), String> {
        if self.bands.is_empty() {
            return Err("tariff schedule has no bands".to_owned());
        }
        const MINUTES_PER_DAY: i64 = 24 * 60;
        let mut covered = vec![false; MINUTES_PER_DAY as usize];
        for band in &self.bands {
            let mut minute = band.start.num_seconds_from_midnight() as i64 / 60;
            let end_minute = band.end.num_seconds_from_midnight() as i64 / 60;
            loop {
                let idx = (minute % MINUTES_PER_DAY) as usize;
                if covered[idx] {
                    return Err(format!("tariff bands overlap at minute {idx}"));
                }
                covered[idx] = true;
                minute += 1;
                if minute % MINUTES_PER_DAY == end_minute {
                    break;
                }
            }
        }
        if covered.iter().any(|c| !c) {
            return Err("tariff bands leave a gap in the 24h day".to_owned());
        }
        if self.service_rate_per_kwh < 0.0 {
            return Err("service_rate_per_kwh must be non-negative".to_owned());
        }
        Ok(())
    }

    fn rate_at(&self, t: NaiveTime) -> f64 {
        self.bands
            .iter()
            .find(|b| b.contains(t))
            .map_or(0.0, |b| b.rate_per_kwh)
    }

    /// Splits `[start, end)` at every local hour boundary, prices each
    /// segment at the rate in force at the segment's start, and sums.
    /// Energy is assumed delivered at the session's constant average power
    /// (`energy_kwh / total_hours`), per the algorithm in §4.1.
    pub fn compute_cost(
        &self,
        energy_kwh: f64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tz: Tz,
    ) -> Result<TariffBill, TariffDomainError> {
        if energy_kwh < 0.0 {
            return Err(TariffDomainError::NegativeEnergy(energy_kwh));
        }
        if end < start {
            return Err(TariffDomainError::InvertedInterval { start, end });
        }

        let service_cost = Cents::from_fractional(energy_kwh * self.service_rate_per_kwh);

        if energy_kwh == 0.0 || end == start {
            return Ok(TariffBill {
                energy_cost: Cents::ZERO,
                service_cost,
            });
        }

        let total_hours = (end - start).num_milliseconds() as f64 / 3_600_000.0;
        let avg_power_kw = energy_kwh / total_hours;

        let local_start = start.with_timezone(&tz);
        let local_end = end.with_timezone(&tz);

        let mut energy_cost_acc = 0.0f64;
        let mut cursor = local_start;
        while cursor < local_end {
            let next_hour_boundary = cursor
                .date_naive()
                .and_hms_opt(cursor.hour(), 0, 0)
                .expect("valid hour")
                .and_local_timezone(tz)
                .single()
                .unwrap_or(cursor)
                + chrono::Duration::hours(1);
            let segment_end = next_hour_boundary.min(local_end);

            let segment_hours =
                (segment_end - cursor).num_milliseconds() as f64 / 3_600_000.0;
            let rate = self.rate_at(cursor.time());
            energy_cost_acc += avg_power_kw * segment_hours * rate;

            cursor = segment_end;
        }

        Ok(TariffBill {
            energy_cost: Cents::from_fractional(energy_cost_acc),
            service_cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::UTC;

    #[test]
    fn default_schedule_validates() {
        TariffSchedule::default().validate().unwrap();
    }

    #[test]
    fn single_hour_peak_session_scenario_1() {
        let schedule = TariffSchedule::default();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap();
        let bill = schedule.compute_cost(30.0, start, end, UTC).unwrap();
        assert_eq!(bill.energy_cost.to_string(), "30.00");
        assert_eq!(bill.service_cost.to_string(), "24.00");
        assert_eq!(bill.total_cost().to_string(), "54.00");
    }

    #[test]
    fn straddles_peak_and_normal_bands() {
        // 09:30 -> 10:30, 30 minutes at 0.70 then 30 minutes at 1.00, 10 kWh total (20kW avg).
        let schedule = TariffSchedule::default();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap();
        let bill = schedule.compute_cost(10.0, start, end, UTC).unwrap();
        // 5 kWh @ 0.70 + 5 kWh @ 1.00 = 3.50 + 5.00 = 8.50
        assert_eq!(bill.energy_cost.to_string(), "8.50");
    }

    #[test]
    fn valley_band_wraps_midnight() {
        let schedule = TariffSchedule::default();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 23, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 1, 0, 0).unwrap();
        let bill = schedule.compute_cost(14.0, start, end, UTC).unwrap();
        assert_eq!(bill.energy_cost.to_string(), "5.60");
    }

    #[test]
    fn zero_energy_is_free() {
        let schedule = TariffSchedule::default();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let bill = schedule.compute_cost(0.0, start, start, UTC).unwrap();
        assert_eq!(bill.total_cost(), Cents::ZERO);
    }

    #[test]
    fn negative_energy_is_fatal() {
        let schedule = TariffSchedule::default();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap();
        assert!(schedule.compute_cost(-1.0, start, end, UTC).is_err());
    }

    #[test]
    fn inverted_interval_is_fatal() {
        let schedule = TariffSchedule::default();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        assert!(schedule.compute_cost(1.0, start, end, UTC).is_err());
    }
}
