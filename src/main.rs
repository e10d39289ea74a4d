use std::env::args;
use std::str::FromStr;
use std::string::ToString;

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use stamped_lock::{demo, StampedLock};

/// `stamped-lock <scenario> [config.toml]`
fn main() -> Result<(), String> {
    let scenario = args()
        .nth(1)
        .ok_or(format!(
            "no scenario supplied, use one of {} or see unit tests",
            Scenario::iter()
                .map(|s| s.to_string())
                .collect::<Vec<String>>()
                .join(",")
        ))
        .and_then(|selector| Scenario::from_str(&selector).map_err(|e| e.to_string()))?;

    let mut config = match args().nth(2) {
        Some(path) => demo::DemoConfig::load(path).map_err(|e| e.to_string())?,
        None => demo::DemoConfig::default(),
    };
    match scenario {
        Scenario::Optimistic => {}
        Scenario::Pessimistic => config.pessimistic = true,
    }

    demo::run_starvation_check(&StampedLock::new(), &config)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

#[derive(EnumIter, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
enum Scenario {
    /// readers try the optimistic path first, like the classic demo
    Optimistic,
    /// every reader takes a read lock => the writer really has to cut into the stream
    Pessimistic,
}
