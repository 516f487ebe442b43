use std::fmt::Write as _;

use crate::registry::UnitCatalogEntry;
use crate::spec::TestSpec;

/// Markdown view of the tool surface, one section per unit. Units that
/// failed to load still show their scanned signatures, marked
/// unavailable, so the author can see what the agent cannot call.
pub fn render_catalog(catalog: &[UnitCatalogEntry]) -> String {
    let mut out = String::new();
    for entry in catalog {
        let suffix = if entry.live {
            ""
        } else {
            " (unavailable: signatures only)"
        };
        let _ = writeln!(out, "### Unit: {}{}", entry.unit, suffix);
        for tool in &entry.tools {
            let _ = writeln!(out, "- `{}` - {}", tool.signature(), tool.description);
        }
        out.push('\n');
    }
    out
}

/// Assembles the single prompt the agent runs under: the scenario
/// document verbatim, the tool catalog, the execution protocol, and the
/// strict response contract the verdict extractor expects.
pub fn render_prompt(spec: &TestSpec, raw_yaml: &str, catalog: &[UnitCatalogEntry]) -> String {
    let mut out = String::new();
    out.push_str(
        "You are an automated test executor. Execute the test scenario below exactly as \
         declared, using only the tools listed, then judge the outcome.\n\n",
    );

    out.push_str("## Test scenario\n\n```yaml\n");
    out.push_str(raw_yaml.trim_end());
    out.push_str("\n```\n\n");

    out.push_str("## Available tools\n\n");
    out.push_str(&render_catalog(catalog));

    out.push_str("## Execution protocol\n\n");
    out.push_str(
        "1. Run `setup` steps in order, then `steps`, then `teardown`. Always run \
         teardown, even after a failure.\n\
         2. Where a step's arguments contain `${stored.<name>}`, the value stored under \
         that name is substituted. Store a step's output with `store_value` when the \
         step declares `save_as`.\n\
         3. Judge each step's output against its `expect` and `analyze` notes.\n\
         4. A step with `retry: N` may be re-attempted up to N extra times, waiting \
         `retry_delay` seconds between attempts. A step with `repeat: N` runs N times.\n\
         5. A step's own `timeout` bounds that single step, in seconds.\n\
         6. When a step fails for good, mark steps that depend on it as skipped.\n\n",
    );

    out.push_str("## Verdict\n\n");
    let _ = writeln!(out, "PASS if: {}", spec.verdict.pass_if.trim());
    if !spec.verdict.fail_if.trim().is_empty() {
        let _ = writeln!(out, "FAIL if: {}", spec.verdict.fail_if.trim());
    }
    out.push_str("If you cannot determine either, the verdict is UNCLEAR.\n\n");
    out.push_str(
        "Respond with ONLY a JSON object of this exact shape, no prose and no code \
         fences:\n\
         {\"verdict\": \"PASS\" | \"FAIL\" | \"UNCLEAR\", \"reason\": \"<one sentence>\", \
         \"steps\": [{\"name\": \"...\", \"status\": \"pass\" | \"fail\" | \"skip\", \
         \"details\": \"...\"}], \"issues\": [\"...\"]}\n",
    );
    out
}
