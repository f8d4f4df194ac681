//! Combining a fragment-stage ELF with a non-fragment-stage ELF.
//!
//! The non-fragment image is the base. Its pixel-stage code is cut off and the
//! fragment image's pixel-stage code is appended on the next code alignment
//! boundary; symbols, the disassembly and IR comment listings, and the
//! metadata note follow the code.

use kiln_elf::names::{
    align_up, CODE_ALIGNMENT, DISASM_SECTION, FORBIDDEN_PS_SYMBOLS, IR_COMMENT_SECTION,
    PIPELINE_SYMBOL_PREFIX, PS_ENTRY_SYMBOL, TEXT_SECTION,
};
use kiln_elf::{merge_section, ElfError, ElfImage, PipelineMetadata};

fn find(haystack: &[u8], needle: &str) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle.as_bytes())
}

fn missing_section(name: &str) -> ElfError {
    ElfError::MissingSection {
        name: name.to_string(),
    }
}

/// Merges the pixel stage of `fragment` into `non_fragment`.
pub fn merge_elf_images(fragment: &ElfImage, mut non_fragment: ElfImage) -> Result<ElfImage, ElfError> {
    for name in FORBIDDEN_PS_SYMBOLS {
        assert!(
            fragment.symbol(name).is_none(),
            "fragment image carries internal symbol '{name}'"
        );
    }

    let text_index = non_fragment
        .section_index(TEXT_SECTION)
        .ok_or_else(|| missing_section(TEXT_SECTION))?;
    let fragment_text_index = fragment
        .section_index(TEXT_SECTION)
        .ok_or_else(|| missing_section(TEXT_SECTION))?;

    // Drop the old pixel stage: every code symbol from its entry onward.
    let mut first_isa_symbol = None;
    let mut isa_offset = None;
    let text_symbols: Vec<usize> = non_fragment
        .symbols_in_section(text_index)
        .map(|(position, _)| position)
        .collect();
    for position in text_symbols {
        let symbol = &mut non_fragment.symbols[position];
        if first_isa_symbol.is_none() && symbol.name.starts_with(PIPELINE_SYMBOL_PREFIX) {
            first_isa_symbol = Some(symbol.name.clone());
        }
        if symbol.name == PS_ENTRY_SYMBOL {
            isa_offset = Some(symbol.value as usize);
        }
        if isa_offset.is_some() {
            symbol.section = None;
        }
    }
    let isa_offset = isa_offset.unwrap_or_else(|| {
        align_up(non_fragment.sections[text_index].data.len(), CODE_ALIGNMENT)
    });

    let (fragment_ps_position, fragment_ps) = fragment
        .symbols_in_section(fragment_text_index)
        .find(|(_, symbol)| symbol.name == PS_ENTRY_SYMBOL)
        .ok_or_else(|| ElfError::Malformed {
            reason: format!("fragment image has no '{PS_ENTRY_SYMBOL}' symbol"),
        })?;
    let fragment_ps_value = fragment_ps.value;

    let code = merge_section(
        &non_fragment.sections[text_index].data,
        isa_offset,
        None,
        &fragment.sections[fragment_text_index].data,
        fragment_ps_value as usize,
        None,
    );
    non_fragment.sections[text_index].data = code;

    for (_, symbol) in fragment
        .symbols_in_section(fragment_text_index)
        .filter(|(position, _)| *position >= fragment_ps_position)
    {
        let relative = symbol
            .value
            .checked_sub(fragment_ps_value)
            .ok_or_else(|| ElfError::Malformed {
                reason: format!(
                    "symbol '{}' precedes '{PS_ENTRY_SYMBOL}' in the fragment code",
                    symbol.name
                ),
            })?;
        let merged = non_fragment.symbol_or_insert(&symbol.name);
        merged.section = Some(text_index);
        merged.value = isa_offset as u64 + relative;
        merged.size = symbol.size;
        merged.info = symbol.info;
    }

    for name in [DISASM_SECTION, IR_COMMENT_SECTION] {
        let Some(index) = non_fragment.section_index(name) else {
            continue;
        };
        let fragment_listing = &fragment
            .section(name)
            .ok_or_else(|| missing_section(name))?
            .data;
        let fragment_offset = find(fragment_listing, PS_ENTRY_SYMBOL).unwrap_or(0);
        let listing = &non_fragment.sections[index].data;
        let size = find(listing, PS_ENTRY_SYMBOL).unwrap_or(listing.len());
        let merged = merge_section(
            listing,
            size,
            first_isa_symbol.as_deref(),
            fragment_listing,
            fragment_offset,
            Some(PS_ENTRY_SYMBOL),
        );
        non_fragment.sections[index].data = merged;
    }

    let fragment_metadata = PipelineMetadata::from_image(fragment)?.ok_or_else(|| ElfError::Metadata {
        reason: "fragment image has no pipeline metadata".to_string(),
    })?;
    let non_fragment_metadata =
        PipelineMetadata::from_image(&non_fragment)?.ok_or_else(|| ElfError::Metadata {
            reason: "non-fragment image has no pipeline metadata".to_string(),
        })?;
    PipelineMetadata::merge(&fragment_metadata, &non_fragment_metadata)?.store(&mut non_fragment)?;

    Ok(non_fragment)
}

/// Merges two serialized images; see [`merge_elf_images`].
pub fn merge_elf_binary(fragment: &[u8], non_fragment: &[u8]) -> Result<Vec<u8>, ElfError> {
    let fragment = ElfImage::parse(fragment)?;
    let non_fragment = ElfImage::parse(non_fragment)?;
    let merged = merge_elf_images(&fragment, non_fragment)?;
    log::debug!(
        "merged pipeline ELF: {} code bytes, {} symbols",
        merged
            .section(TEXT_SECTION)
            .map_or(0, |section| section.data.len()),
        merged.symbols.len()
    );
    Ok(merged.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_common::ContentHash;
    use kiln_elf::{ApiShaderMetadata, ElfSection, ElfSymbol, HwStage, HwStageMetadata};
    use std::collections::BTreeMap;

    fn metadata(shader: &str, stage: HwStage, vgprs: u32) -> PipelineMetadata {
        PipelineMetadata {
            api: "Vulkan".into(),
            user_data_limit: 2,
            spill_threshold: u32::MAX,
            shaders: BTreeMap::from([(
                shader.to_string(),
                ApiShaderMetadata {
                    hash: ContentHash::from_u128(vgprs as u128),
                    hardware_mapping: vec![stage],
                },
            )]),
            hardware_stages: BTreeMap::from([(
                stage,
                HwStageMetadata {
                    vgpr_count: vgprs,
                    ..HwStageMetadata::default()
                },
            )]),
        }
    }

    /// A full VS + PS image with both blocks and listings.
    fn full_image() -> ElfImage {
        let mut image = ElfImage::new(0);
        let mut code = vec![0xAA; 0x10];
        code.resize(0x100, 0);
        code.extend([0xBB; 0x08]);
        let text = image.add_section(ElfSection::code(TEXT_SECTION, code));
        image.add_section(ElfSection::text(
            DISASM_SECTION,
            "  v_mov_b32 v0, 0\n  s_endpgm\n_amdgpu_ps_main:\n  v_old\n  s_endpgm\n",
        ));
        image.symbols.push(ElfSymbol::function("_amdgpu_vs_main", text, 0, 0x10));
        image.symbols.push(ElfSymbol::function("_amdgpu_ps_main", text, 0x100, 0x08));
        let mut md = metadata(".vertex", HwStage::Vs, 8);
        md.shaders.insert(
            ".pixel".into(),
            ApiShaderMetadata {
                hash: ContentHash::from_u128(99),
                hardware_mapping: vec![HwStage::Ps],
            },
        );
        md.hardware_stages.insert(HwStage::Ps, HwStageMetadata::default());
        md.store(&mut image).unwrap();
        image
    }

    /// A PS-only image.
    fn fragment_image() -> ElfImage {
        let mut image = ElfImage::new(0);
        let text = image.add_section(ElfSection::code(TEXT_SECTION, vec![0xCC; 0x0C]));
        image.add_section(ElfSection::text(DISASM_SECTION, "  v_new\n  s_endpgm\n"));
        image.symbols.push(ElfSymbol::function("_amdgpu_ps_main", text, 0, 0x0C));
        metadata(".pixel", HwStage::Ps, 32).store(&mut image).unwrap();
        image
    }

    #[test]
    fn pixel_code_is_replaced() {
        let merged = merge_elf_images(&fragment_image(), full_image()).unwrap();
        let code = &merged.section(TEXT_SECTION).unwrap().data;
        assert_eq!(code.len(), 0x100 + 0x0C);
        assert_eq!(&code[..0x10], &[0xAA; 0x10]);
        assert_eq!(&code[0x100..], &[0xCC; 0x0C]);

        let ps = merged.symbol(PS_ENTRY_SYMBOL).unwrap();
        assert_eq!(ps.value, 0x100);
        assert_eq!(ps.size, 0x0C);
        assert!(ps.section.is_some());
        assert_eq!(merged.symbol("_amdgpu_vs_main").unwrap().value, 0);
    }

    #[test]
    fn listing_keeps_one_label_per_stage() {
        let merged = merge_elf_images(&fragment_image(), full_image()).unwrap();
        let disasm = String::from_utf8(merged.section(DISASM_SECTION).unwrap().data.clone()).unwrap();
        assert_eq!(
            disasm,
            "_amdgpu_vs_main:\n  v_mov_b32 v0, 0\n  s_endpgm\n_amdgpu_ps_main:\n  v_new\n  s_endpgm\n"
        );
    }

    #[test]
    fn metadata_takes_pixel_from_fragment() {
        let merged = merge_elf_images(&fragment_image(), full_image()).unwrap();
        let md = PipelineMetadata::from_image(&merged).unwrap().unwrap();
        assert_eq!(md.hardware_stages[&HwStage::Ps].vgpr_count, 32);
        assert_eq!(md.hardware_stages[&HwStage::Vs].vgpr_count, 8);
        assert_eq!(md.shaders[".pixel"].hash, ContentHash::from_u128(32));
    }

    #[test]
    fn non_fragment_without_pixel_appends_aligned() {
        let mut base = ElfImage::new(0);
        let text = base.add_section(ElfSection::code(TEXT_SECTION, vec![0xAA; 0x24]));
        base.symbols.push(ElfSymbol::function("_amdgpu_vs_main", text, 0, 0x24));
        metadata(".vertex", HwStage::Vs, 8).store(&mut base).unwrap();
        let mut fragment = fragment_image();
        fragment.sections.retain(|s| s.name != DISASM_SECTION);

        let merged = merge_elf_images(&fragment, base).unwrap();
        assert_eq!(merged.symbol(PS_ENTRY_SYMBOL).unwrap().value, 0x100);
        assert_eq!(merged.section(TEXT_SECTION).unwrap().data.len(), 0x10C);
    }

    #[test]
    fn fragment_listing_is_required_when_base_has_one() {
        let mut fragment = fragment_image();
        fragment.sections.retain(|s| s.name != DISASM_SECTION);
        let err = merge_elf_images(&fragment, full_image()).unwrap_err();
        assert!(matches!(err, ElfError::MissingSection { .. }));
    }

    #[test]
    fn metadata_is_required() {
        let mut fragment = fragment_image();
        fragment.notes.clear();
        let err = merge_elf_images(&fragment, full_image()).unwrap_err();
        assert!(matches!(err, ElfError::Metadata { .. }));
    }

    #[test]
    #[should_panic(expected = "internal symbol")]
    fn internal_pixel_symbols_are_never_present() {
        let mut fragment = fragment_image();
        fragment
            .symbols
            .push(ElfSymbol::function(FORBIDDEN_PS_SYMBOLS[0], 0, 0, 0));
        let _ = merge_elf_images(&fragment, full_image());
    }

    #[test]
    fn serialized_merge() {
        let bytes =
            merge_elf_binary(&fragment_image().to_bytes(), &full_image().to_bytes()).unwrap();
        let merged = ElfImage::parse(&bytes).unwrap();
        assert_eq!(merged.symbol(PS_ENTRY_SYMBOL).unwrap().value, 0x100);
        assert!(merge_elf_binary(b"nope", &full_image().to_bytes()).is_err());
    }
}
