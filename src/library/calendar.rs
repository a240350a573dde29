use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Calendar used for the Year tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarSystem {
    #[default]
    Gregorian,
    /// Solar Hijri; the year turns over at Nowruz (20 or 21 March)
    Persian,
}

impl CalendarSystem {
    pub fn year(self, date: NaiveDate) -> i32 {
        match self {
            CalendarSystem::Gregorian => date.year(),
            CalendarSystem::Persian => {
                let persian_year = date.year() - 621;
                let nowruz = nowruz_march_day(persian_year).unwrap_or(21);
                if (date.month(), date.day()) >= (3, nowruz) {
                    persian_year
                } else {
                    persian_year - 1
                }
            }
        }
    }
}

/// Persian years where the 33-year leap pattern shifts
const LEAP_BREAKS: [i32; 20] = [
    -61, 9, 38, 199, 426, 686, 756, 818, 1111, 1181, 1210, 1635, 2060, 2097, 2192, 2262, 2324, 2394, 2456, 3178,
];

/// Day of March on which Persian year `year` begins (1 Farvardin), from the
/// leap-cycle tables that track the vernal equinox. `None` outside the
/// tabulated range.
fn nowruz_march_day(year: i32) -> Option<u32> {
    let last = LEAP_BREAKS[LEAP_BREAKS.len() - 1];
    if year < LEAP_BREAKS[0] || year >= last {
        return None;
    }

    let mut leaps = -14;
    let mut start = LEAP_BREAKS[0];
    let mut jump = 0;
    for &next in &LEAP_BREAKS[1..] {
        jump = next - start;
        if year < next {
            break;
        }
        leaps += jump / 33 * 8 + jump % 33 / 4;
        start = next;
    }

    let n = year - start;
    leaps += n / 33 * 8 + (n % 33 + 3) / 4;
    if jump % 33 == 4 && jump - n == 4 {
        leaps += 1;
    }

    let gregorian_year = year + 621;
    let gregorian_leaps = gregorian_year / 4 - (gregorian_year / 100 + 1) * 3 / 4 - 150;
    u32::try_from(20 + leaps - gregorian_leaps).ok()
}
