//! `kiln module`, `kiln compute` and `kiln graphics`.
//!
//! Module builds run in parallel on the rayon pool; a single compiler
//! instance is shared by every worker.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use kiln_common::ShaderStage;
use kiln_compiler::{
    Compiler, ComputePipelineBuildInfo, GraphicsPipelineBuildInfo, PipelineOptions,
    PipelineOutput, PipelineShaderInfo, ShaderModuleData, ShaderModuleOptions,
};
use rayon::prelude::*;

use crate::session::{default_output, open_compiler, read_input, write_output};
use crate::{CliError, ComputeArgs, GlobalArgs, GraphicsArgs, ListingArgs, ModuleArgs};

type CliResult<T> = Result<T, CliError>;

/// Runs `kiln module`. Returns 1 if any input failed to build.
pub fn module(args: &ModuleArgs, global: &GlobalArgs) -> CliResult<i32> {
    let compiler = open_compiler(global)?;
    let options = ShaderModuleOptions {
        enable_opt: args.lower,
    };

    let results: Vec<(&PathBuf, CliResult<ShaderModuleData>)> = args
        .inputs
        .par_iter()
        .map(|path| (path, build_module(&compiler, path, &options)))
        .collect();

    let mut failures = 0;
    for (path, result) in results {
        match result {
            Ok(module) => {
                if !global.quiet {
                    println!(
                        "{}  {:?}  hash {}  cache {}  entries {}",
                        path.display(),
                        module.bin_type,
                        module.hash,
                        module.info.cache_hash,
                        module.info.entries.len()
                    );
                }
                if let Some(dir) = &args.out_dir {
                    let name = path.file_name().unwrap_or(path.as_os_str());
                    let target = dir.join(name).with_extension("kmod");
                    write_output(&target, &module.to_bytes()?)?;
                }
            }
            Err(e) => {
                eprintln!("error: {}: {e}", path.display());
                failures += 1;
            }
        }
    }

    if failures > 0 {
        log::warn!("{failures} of {} modules failed", args.inputs.len());
        return Ok(1);
    }
    Ok(0)
}

fn build_module(
    compiler: &Compiler,
    path: &Path,
    options: &ShaderModuleOptions,
) -> CliResult<ShaderModuleData> {
    let code = read_input(path)?;
    Ok(compiler.build_shader_module(&code, options)?)
}

fn pipeline_options(listings: &ListingArgs) -> PipelineOptions {
    PipelineOptions {
        include_disassembly: listings.disasm,
        include_ir: listings.ir,
        ..PipelineOptions::default()
    }
}

fn open_dump(path: Option<&Path>) -> CliResult<Option<BufWriter<File>>> {
    path.map(|p| {
        File::create(p)
            .map(BufWriter::new)
            .map_err(|e| format!("cannot create {}: {e}", p.display()).into())
    })
    .transpose()
}

fn finish(
    output: PipelineOutput,
    target: &Path,
    dump: Option<BufWriter<File>>,
    global: &GlobalArgs,
) -> CliResult<i32> {
    if let Some(mut dump) = dump {
        dump.flush()?;
    }
    write_output(target, &output.elf)?;
    if !global.quiet {
        eprintln!(
            "   Pipeline 0x{:016X}  cache {}{}",
            output.pipeline_hash.compact64(),
            output.cache_hash,
            if output.from_cache { "  (cached)" } else { "" }
        );
        eprintln!("      Wrote {} ({} bytes)", target.display(), output.elf.len());
    }
    Ok(0)
}

/// Runs `kiln compute`.
pub fn compute(args: &ComputeArgs, global: &GlobalArgs) -> CliResult<i32> {
    let compiler = open_compiler(global)?;
    let module = build_module(&compiler, &args.shader, &ShaderModuleOptions::default())?;

    let info = ComputePipelineBuildInfo {
        cs: PipelineShaderInfo::new(ShaderStage::Compute, &module, &args.entry),
        options: pipeline_options(&args.listings),
        ..ComputePipelineBuildInfo::default()
    };

    let mut dump = open_dump(args.dump.as_deref())?;
    let output = match dump.as_mut() {
        Some(sink) => compiler.build_compute_pipeline(&info, Some(sink as &mut dyn Write))?,
        None => compiler.build_compute_pipeline(&info, None)?,
    };

    let target = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.shader, "elf"));
    finish(output, &target, dump, global)
}

/// Runs `kiln graphics`.
pub fn graphics(args: &GraphicsArgs, global: &GlobalArgs) -> CliResult<i32> {
    let stages = [
        (ShaderStage::Vertex, &args.vs),
        (ShaderStage::TessControl, &args.tcs),
        (ShaderStage::TessEval, &args.tes),
        (ShaderStage::Geometry, &args.gs),
        (ShaderStage::Fragment, &args.fs),
    ];
    let Some(first) = stages.iter().find_map(|(_, path)| path.as_ref()) else {
        return Err("graphics pipeline needs at least one of --vs, --tcs, --tes, --gs, --fs".into());
    };

    let compiler = open_compiler(global)?;
    let modules = stages
        .iter()
        .map(|(stage, path)| {
            path.as_ref()
                .map(|p| {
                    build_module(&compiler, p, &ShaderModuleOptions::default())
                        .map(|m| (*stage, m))
                })
                .transpose()
        })
        .collect::<CliResult<Vec<_>>>()?;

    let mut info = GraphicsPipelineBuildInfo {
        options: pipeline_options(&args.listings),
        ..GraphicsPipelineBuildInfo::default()
    };
    for (stage, module) in modules.iter().flatten() {
        let shader = PipelineShaderInfo::new(*stage, module, &args.entry);
        match stage {
            ShaderStage::Vertex => info.vs = shader,
            ShaderStage::TessControl => info.tcs = shader,
            ShaderStage::TessEval => info.tes = shader,
            ShaderStage::Geometry => info.gs = shader,
            ShaderStage::Fragment => info.fs = shader,
            ShaderStage::Compute => unreachable!("compute is not a graphics stage"),
        }
    }

    let mut dump = open_dump(args.dump.as_deref())?;
    let output = match dump.as_mut() {
        Some(sink) => compiler.build_graphics_pipeline(&info, Some(sink as &mut dyn Write))?,
        None => compiler.build_graphics_pipeline(&info, None)?,
    };

    let target = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(first, "elf"));
    finish(output, &target, dump, global)
}
