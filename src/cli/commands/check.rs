//! Check command: load and validate a rule file.

use std::path::Path;

use anyhow::Context;

use crate::rules::RuleSet;

/// Load the rule file and print one line per container.
pub fn run_check(rules_path: &Path) -> anyhow::Result<()> {
    let rules = RuleSet::load(rules_path)
        .with_context(|| format!("invalid rule file {}", rules_path.display()))?;

    println!("{}: {} container(s)", rules_path.display(), rules.len());
    for line in summarize(&rules) {
        println!("  {line}");
    }
    Ok(())
}

fn summarize(rules: &RuleSet) -> Vec<String> {
    rules
        .iter()
        .enumerate()
        .map(|(index, container)| format!("#{index} {container}"))
        .collect()
}
