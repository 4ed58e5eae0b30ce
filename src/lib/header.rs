//! SAM header helpers.
//!
//! @PG bookkeeping with PP (previous program) chaining, lookups of the reference a BAM is aligned
//! against, read-group chemistry decoding, and the @SQ rewrite cleric performs when it moves
//! reads onto a new reference.

use anyhow::{Context, Result};
use bstr::BString;
use noodles::sam::Header;
use noodles::sam::header::record::value::Map;
use noodles::sam::header::record::value::map::program::tag;
use noodles::sam::header::record::value::map::read_group::tag as rg_tag;
use noodles::sam::header::record::value::map::{Program, ReferenceSequence};
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;

/// Program name written into @PG records.
pub const PROGRAM_NAME: &str = "minorseq";

/// Binding/sequencing kit part numbers for chemistries with a well-known name.
const KNOWN_CHEMISTRIES: &[(&str, &str, &str)] = &[
    ("100-372-700", "100-356-200", "P6-C4"),
    ("100-619-300", "100-620-000", "S/P1-C1/beta"),
];

/// Get the ID of the last program in the @PG chain, i.e. the one no other program names as PP.
#[must_use]
pub fn get_last_program_id(header: &Header) -> Option<String> {
    let programs = header.programs();
    let program_map = programs.as_ref();

    let referenced: HashSet<&[u8]> = program_map
        .values()
        .filter_map(|pg| pg.other_fields().get(&tag::PREVIOUS_PROGRAM_ID))
        .map(|pp| pp.as_slice())
        .collect();

    program_map
        .keys()
        .find(|id| !referenced.contains(id.as_slice()))
        .or_else(|| program_map.keys().next())
        .map(|id| String::from_utf8_lossy(id).to_string())
}

/// Create a unique program ID by appending .1, .2, etc. if `base_id` is taken.
#[must_use]
pub fn make_unique_program_id(header: &Header, base_id: &str) -> String {
    let programs = header.programs();
    let program_map = programs.as_ref();

    if !program_map.contains_key(base_id.as_bytes()) {
        return base_id.to_string();
    }
    (1..)
        .map(|i| format!("{base_id}.{i}"))
        .find(|candidate| !program_map.contains_key(candidate.as_bytes()))
        .unwrap_or_else(|| base_id.to_string())
}

/// Add a @PG record for this run, chained to the last existing program.
///
/// # Errors
///
/// Returns an error if the program record cannot be built or added.
pub fn add_pg_record(mut header: Header, version: &str, command_line: &str) -> Result<Header> {
    let previous_program = get_last_program_id(&header);
    let unique_id = make_unique_program_id(&header, PROGRAM_NAME);

    let mut builder = Map::<Program>::builder()
        .insert(tag::NAME, PROGRAM_NAME)
        .insert(tag::VERSION, version)
        .insert(tag::COMMAND_LINE, command_line);
    if let Some(pp) = previous_program.as_deref() {
        builder = builder.insert(tag::PREVIOUS_PROGRAM_ID, pp);
    }
    let pg_record = builder.build()?;

    header.programs_mut().add(BString::from(unique_id), pg_record)?;
    Ok(header)
}

/// Name of the first @SQ line, which is the reference the reads are aligned against.
#[must_use]
pub fn first_reference_name(header: &Header) -> Option<String> {
    header.reference_sequences().keys().next().map(ToString::to_string)
}

/// Replace every @SQ line with a single entry for `name` of length `length`.
///
/// # Errors
///
/// Returns an error if `length` is zero.
pub fn retarget_header(header: &Header, name: &str, length: usize) -> Result<Header> {
    let length = NonZeroUsize::new(length)
        .with_context(|| format!("Target reference '{name}' has zero length"))?;
    let mut header = header.clone();
    let sequences = header.reference_sequences_mut();
    sequences.clear();
    sequences.insert(BString::from(name), Map::<ReferenceSequence>::new(length));
    Ok(header)
}

/// Decode a chemistry name from a PacBio read group description.
///
/// The description is a `;`-separated list of `KEY=VALUE` pairs. Known binding/sequencing kit
/// pairs map to their chemistry name and unknown pairs come back as `BINDINGKIT/SEQUENCINGKIT`.
/// Returns an empty string when neither kit is present.
#[must_use]
pub fn chemistry_from_description(description: &str) -> String {
    let mut binding = "";
    let mut sequencing = "";
    for field in description.split(';') {
        match field.split_once('=') {
            Some(("BINDINGKIT", v)) => binding = v.trim(),
            Some(("SEQUENCINGKIT", v)) => sequencing = v.trim(),
            _ => {}
        }
    }
    if binding.is_empty() && sequencing.is_empty() {
        return String::new();
    }
    KNOWN_CHEMISTRIES
        .iter()
        .find(|(b, s, _)| *b == binding && *s == sequencing)
        .map_or_else(|| format!("{binding}/{sequencing}"), |(_, _, name)| (*name).to_string())
}

/// Map of read group ID to chemistry name for every @RG line in the header.
#[must_use]
pub fn read_group_chemistries(header: &Header) -> HashMap<String, String> {
    header
        .read_groups()
        .iter()
        .map(|(id, rg)| {
            let chemistry = rg
                .other_fields()
                .get(&rg_tag::DESCRIPTION)
                .map(|ds| chemistry_from_description(&ds.to_string()))
                .unwrap_or_default();
            (id.to_string(), chemistry)
        })
        .collect()
}
