//! `kiln merge` and `kiln stats`: commands that work on finished binaries.

use kiln_compiler::merge_elf_binary;
use kiln_elf::{pipeline_statistics, PipelineStatistics};

use crate::session::{read_input, write_output};
use crate::{CliError, GlobalArgs, MergeArgs, ReportFormat, StatsArgs};

/// Runs `kiln merge`.
pub fn merge(args: &MergeArgs, global: &GlobalArgs) -> Result<i32, CliError> {
    let fragment = read_input(&args.fragment)?;
    let non_fragment = read_input(&args.non_fragment)?;
    let merged = merge_elf_binary(&fragment, &non_fragment)?;
    write_output(&args.output, &merged)?;
    if !global.quiet {
        eprintln!(
            "     Merged {} + {} -> {} ({} bytes)",
            args.fragment.display(),
            args.non_fragment.display(),
            args.output.display(),
            merged.len()
        );
    }
    Ok(0)
}

/// Runs `kiln stats`.
pub fn stats(args: &StatsArgs) -> Result<i32, CliError> {
    let elf = read_input(&args.input)?;
    let stats = pipeline_statistics(&elf)?;
    println!("{}", render(&stats, args.format)?);
    Ok(0)
}

fn render(stats: &PipelineStatistics, format: ReportFormat) -> Result<String, CliError> {
    Ok(match format {
        ReportFormat::Json => serde_json::to_string_pretty(stats)?,
        ReportFormat::Text => format!(
            "VGPRs:   {} / {}\nSGPR spill: {}\nScratch:    {}",
            stats.num_used_vgprs,
            stats.num_available_vgprs,
            yes_no(stats.sgpr_spill),
            yes_no(stats.use_scratch_buffer)
        ),
    })
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
