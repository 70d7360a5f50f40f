//! The `scenarios` subcommand: list data generation profiles.

use std::io::Write;

use anyhow::Result;

use pulse_core::types::DataScenario;

const fn describe(scenario: DataScenario) -> &'static str {
    match scenario {
        DataScenario::Steady => "constant volume, values around per-category baselines",
        DataScenario::Burst => "periodic multi-batch surges over a steady floor",
        DataScenario::Ramp => "volume and values drift upward over time",
        DataScenario::Quiet => "sparse trickle at a fraction of the configured volume",
    }
}

/// Prints the available scenarios with a one-line description each.
pub fn run<W: Write>(writer: &mut W) -> Result<()> {
    for scenario in DataScenario::ALL {
        writeln!(writer, "{scenario:<8}{}", describe(scenario))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_every_scenario() {
        let mut output = Vec::new();
        run(&mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        insta::assert_snapshot!(text, @r"
        steady  constant volume, values around per-category baselines
        burst   periodic multi-batch surges over a steady floor
        ramp    volume and values drift upward over time
        quiet   sparse trickle at a fraction of the configured volume
        ");
    }
}
