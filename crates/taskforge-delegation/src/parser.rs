use crate::model::{Options, ParsedArguments, Pattern};

/// Parse a command-like argument string into [`Options`] plus the remaining
/// free-text task description (spec.md §4.F / §6).
///
/// Recognized flags: `--pattern`/`-p <value>`, `--depth`/`-d <value>`,
/// `--agents`/`-a <value>`, `--budget <value>`, `--dry-run`, `--force`/`-f`.
/// Everything else is joined (in order) into the task description.
pub fn parse_arguments(arg_string: &str) -> ParsedArguments {
    let mut options = Options::default();
    let mut description_tokens = Vec::new();

    let tokens: Vec<&str> = arg_string.split_whitespace().collect();
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        match token {
            "--pattern" | "-p" => {
                if let Some(value) = tokens.get(i + 1) {
                    options.pattern = value.parse::<Pattern>().ok();
                    i += 1;
                }
            }
            "--depth" | "-d" => {
                if let Some(value) = tokens.get(i + 1) {
                    options.depth = value.parse().ok();
                    i += 1;
                }
            }
            "--agents" | "-a" => {
                if let Some(value) = tokens.get(i + 1) {
                    options.agents = value.parse().ok();
                    i += 1;
                }
            }
            "--budget" => {
                if let Some(value) = tokens.get(i + 1) {
                    options.budget = value.parse().ok();
                    i += 1;
                }
            }
            "--dry-run" => options.dry_run = true,
            "--force" | "-f" => options.force = true,
            other => description_tokens.push(other),
        }
        i += 1;
    }

    ParsedArguments {
        options,
        task_description: description_tokens.join(" "),
    }
}
