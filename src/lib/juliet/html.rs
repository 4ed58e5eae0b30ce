//! Self-contained HTML rendering of a [`JulietReport`].

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::Result;

use crate::dna::{NUCLEOTIDES, nucleotide_to_tag};
use crate::juliet::caller::{JulietReport, VariantPosition};
use crate::juliet::target_config::TargetConfig;

/// Colors cycled through for haplotype columns.
const HAPLOTYPE_COLORS: [&str; 8] =
    ["#ea3c1c", "#f48e00", "#ebff0a", "#56e400", "#51c6ff", "#4a80ff", "#ae37ff", "#db005f"];

const STYLE: &str = r"
body { font-family: Helvetica, Arial, sans-serif; font-size: 14px; }
table { border-collapse: collapse; }
th, td { padding: 2px 6px; text-align: center; }
table.discovery tr.var td { border-top: 1px solid #ccc; }
table.msacounts td { font-size: 12px; color: #555; }
table.drmview td, table.drmview th { border-bottom: 1px solid #ddd; }
.mutated { color: #E90032; }
";

/// Escape `&`, quotes, `<` and `>`.
///
/// # Examples
///
/// ```
/// use minorseq_lib::juliet::html::escape_html;
///
/// assert_eq!(escape_html("a<b & 'c'"), "a&lt;b &amp; &apos;c&apos;");
/// ```
#[must_use]
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// A frequency as a percentage truncated to two significant digits.
fn format_frequency(frequency: f64) -> String {
    if !frequency.is_finite() || frequency <= 0.0 {
        return "0".to_string();
    }
    let mut exp = 1;
    while (frequency * 10f64.powi(exp)).trunc() < 10.0 {
        exp += 1;
    }
    let truncated = (frequency * 10f64.powi(exp)).trunc();
    format!("{}", truncated / 10f64.powi(exp - 2))
}

/// Render the full report page.
///
/// # Errors
/// Returns an error if writing to `out` fails.
pub fn write_html<W: Write>(
    out: &mut W,
    report: &JulietReport,
    config: &TargetConfig,
    drm_only: bool,
    input: &str,
    command_line: &str,
) -> Result<()> {
    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html><head><meta charset=\"utf-8\"/>")?;
    writeln!(out, "<title>Juliet Minor Variant Summary</title>")?;
    writeln!(out, "<style>{STYLE}</style></head><body>")?;
    writeln!(out, "<h1>Juliet Minor Variant Summary</h1>")?;

    writeln!(out, "<details style=\"margin-bottom: 20px\"><summary>Input data</summary><table>")?;
    writeln!(out, "<tr><td>Input file:</td><td><code>{}</code></td></tr>", escape_html(input))?;
    writeln!(
        out,
        "<tr><td>Command line:</td><td><code>{}</code></td></tr>",
        escape_html(command_line)
    )?;
    writeln!(
        out,
        "<tr><td>Known DRMs only:</td><td><code>{}</code></td></tr>",
        if drm_only { "yes" } else { "no" }
    )?;
    writeln!(out, "</table></details>")?;

    write_target_config(out, config)?;

    writeln!(out, "<details open style=\"margin-bottom: 20px\"><summary>Variant Discovery</summary>")?;
    writeln!(out, "<div style=\"margin-left:20px; padding-top:10px\">")?;
    write_discovery(out, report, config)?;
    writeln!(out, "</div></details>")?;

    writeln!(out, "<details style=\"margin-bottom: 20px\"><summary>Drug Summaries</summary>")?;
    write_drm_view(out, report)?;
    writeln!(out, "</details>")?;
    writeln!(out, "<p>This software is for research only and has not been clinically validated!</p>")?;
    writeln!(out, "</body></html>")?;
    Ok(())
}

fn na_or(value: &str) -> String {
    if value.is_empty() { "NA".to_string() } else { escape_html(value) }
}

fn write_target_config<W: Write>(out: &mut W, config: &TargetConfig) -> Result<()> {
    writeln!(out, "<details style=\"margin-bottom: 20px\"><summary>Target config</summary>")?;
    writeln!(out, "<div style=\"padding-left:20px;padding-top:10px\"><table>")?;
    writeln!(out, "<tr><td>Config Version:</td><td><code>{}</code></td></tr>", na_or(&config.version))?;
    writeln!(
        out,
        "<tr><td>Reference Name:</td><td><code>{}</code></td></tr>",
        na_or(&config.reference_name)
    )?;
    let length = if config.reference_sequence.is_empty() {
        "NA".to_string()
    } else {
        config.reference_sequence.len().to_string()
    };
    writeln!(out, "<tr><td>Reference Length:</td><td><code>{length}</code></td></tr>")?;
    if config.genes.is_empty() {
        writeln!(out, "<tr><td>Genes:</td><td><code>NA</code></td></tr>")?;
    }
    writeln!(out, "</table>")?;

    if !config.genes.is_empty() {
        writeln!(out, "Genes:<ul>")?;
        for gene in &config.genes {
            write!(out, "<li><b>{}</b> ({}-{})", escape_html(&gene.name), gene.begin, gene.end)?;
            if !gene.drms.is_empty() {
                write!(out, "<ul>")?;
                for drm in &gene.drms {
                    let positions: Vec<String> =
                        drm.positions.iter().map(ToString::to_string).collect();
                    write!(
                        out,
                        "<li><code>{}: {}</code></li>",
                        escape_html(&drm.name),
                        escape_html(&positions.join(" "))
                    )?;
                }
                write!(out, "</ul>")?;
            }
            writeln!(out, "</li>")?;
        }
        writeln!(out, "</ul>")?;
    }
    writeln!(out, "</div></details>")?;
    Ok(())
}

fn write_haplotype_counts<W: Write>(out: &mut W, report: &JulietReport) -> Result<()> {
    let counts = &report.haplotype_read_counts;
    writeln!(out, "<table class=\"hapcounts\">")?;
    writeln!(out, "<tr><td><b>Haplotype Category</b></td><td><b>#Reads</b></td></tr>")?;
    for (label, count) in [
        ("Reported", counts.healthy_reported),
        ("Insufficient Coverage (unreported)", counts.healthy_low_coverage),
        ("Overall Damaged (unreported)", counts.all_damaged),
        ("- Marginal Gaps", counts.marginal_with_gaps),
        ("- Marginal Heteroduplexes", counts.marginal_with_heteroduplexes),
        ("- Marginal Partial", counts.marginal_partial_reads),
    ] {
        writeln!(out, "<tr><td>{}</td><td>{count}</td></tr>", escape_html(label))?;
    }
    writeln!(out, "</table>")?;
    Ok(())
}

fn write_discovery<W: Write>(
    out: &mut W,
    report: &JulietReport,
    config: &TargetConfig,
) -> Result<()> {
    if report.genes.is_empty() {
        writeln!(out, "<p>No variants found.</p>")?;
    }
    let num_haplotypes = report.haplotypes.len();
    let reference = if config.reference_name.is_empty() {
        "Majority Call".to_string()
    } else {
        escape_html(&config.reference_name)
    };

    for gene in &report.genes {
        writeln!(out, "<table class=\"discovery\">")?;
        write!(out, "<tr><th colspan=\"8\">{}</th>", escape_html(&gene.name))?;
        for (i, haplotype) in report.haplotypes.iter().enumerate() {
            write!(
                out,
                "<th style=\"color:{}\">{}</th>",
                HAPLOTYPE_COLORS[i % HAPLOTYPE_COLORS.len()],
                escape_html(&haplotype.name)
            )?;
        }
        writeln!(out, "</tr>")?;

        write!(out, "<tr><th colspan=\"3\">{reference}</th><th colspan=\"5\">Sample Variants</th>")?;
        if num_haplotypes > 0 {
            write!(out, "<th colspan=\"{num_haplotypes}\">Haplotypes %</th>")?;
        }
        writeln!(out, "</tr>")?;

        write!(
            out,
            "<tr><th>Codon</th><th>AA</th><th>Pos</th><th>AA</th><th>Codon</th><th>%</th>\
             <th>Coverage</th><th>Affected Drugs{}</th>",
            if config.db_version.is_empty() { "" } else { "<sup>*</sup>" }
        )?;
        for haplotype in &report.haplotypes {
            write!(
                out,
                "<th title=\"{} reads\">{}</th>",
                haplotype.size(),
                (1000.0 * haplotype.frequency).round() / 10.0
            )?;
        }
        writeln!(out, "</tr>")?;

        for position in &gene.variant_positions {
            write_variant_position(out, position)?;
        }
        writeln!(out, "</table>")?;
    }

    if !config.db_version.is_empty() {
        writeln!(out, "<b><sup>*</sup>{}</b>", escape_html(&config.db_version))?;
    }
    if num_haplotypes > 0 {
        write_haplotype_counts(out, report)?;
    }
    Ok(())
}

fn write_variant_position<W: Write>(out: &mut W, position: &VariantPosition) -> Result<()> {
    let ref_codon = position.ref_codon.as_bytes();
    let mut first = true;
    for variant in &position.variant_amino_acids {
        for codon in &variant.variant_codons {
            write!(out, "<tr class=\"var\">")?;
            if first {
                let spaced: Vec<String> =
                    position.ref_codon.chars().map(|c| c.to_string()).collect();
                write!(
                    out,
                    "<td>{}</td><td>{}</td><td>{}</td>",
                    escape_html(&spaced.join(" ")),
                    escape_html(&position.ref_amino_acid.to_string()),
                    position.ref_position
                )?;
            } else {
                write!(out, "<td></td><td></td><td></td>")?;
            }
            write!(out, "<td>{}</td><td>", escape_html(&variant.amino_acid.to_string()))?;
            for (i, base) in codon.codon.bytes().enumerate() {
                let nt = escape_html(&char::from(base).to_string());
                if ref_codon.get(i) == Some(&base) {
                    write!(out, "{nt} ")?;
                } else {
                    write!(out, "<b class=\"mutated\">{nt}</b> ")?;
                }
            }
            write!(out, "</td><td>{}</td>", format_frequency(codon.frequency))?;
            if first {
                write!(out, "<td>{}</td>", position.coverage)?;
            } else {
                write!(out, "<td></td>")?;
            }
            write!(out, "<td>{}</td>", escape_html(&codon.known_drm))?;
            for (i, &hit) in codon.haplotype_hit.iter().enumerate() {
                if hit {
                    write!(
                        out,
                        "<td style=\"background-color:{}\"></td>",
                        HAPLOTYPE_COLORS[i % HAPLOTYPE_COLORS.len()]
                    )?;
                } else {
                    write!(out, "<td></td>")?;
                }
            }
            writeln!(out, "</tr>")?;
            first = false;

            writeln!(out, "<tr class=\"msa\"><td colspan=\"3\"></td><td colspan=\"14\">")?;
            write!(out, "<table class=\"msacounts\"><tr><th>Pos</th>")?;
            for nt in NUCLEOTIDES {
                write!(out, "<th>{}</th>", char::from(nt))?;
            }
            writeln!(out, "</tr>")?;
            for column in &position.msa {
                let in_codon = usize::try_from(column.rel_pos)
                    .ok()
                    .and_then(|i| codon.codon.as_bytes().get(i))
                    .and_then(|&b| nucleotide_to_tag(b));
                let wt = u8::try_from(column.wt).ok().and_then(nucleotide_to_tag);
                write!(out, "<tr><td>{}</td>", column.rel_pos)?;
                for (tag, count) in column.counts().iter().enumerate() {
                    let mut style = String::new();
                    if in_codon == Some(tag) {
                        style.push_str("color:#B50A36;");
                    }
                    if wt == Some(tag) {
                        style.push_str("font-weight:bold;");
                    }
                    write!(out, "<td style=\"{style}\">{count}</td>")?;
                }
                writeln!(out, "</tr>")?;
            }
            writeln!(out, "</table></td></tr>")?;
        }
    }
    Ok(())
}

struct DrmHit {
    ref_aa: char,
    ref_pos: usize,
    cur_aa: char,
    frequency: f64,
}

/// Known drug-resistance mutations found in the sample, grouped by drug then gene.
fn write_drm_view<W: Write>(out: &mut W, report: &JulietReport) -> Result<()> {
    let mut by_drug: BTreeMap<String, BTreeMap<(usize, &str), Vec<DrmHit>>> = BTreeMap::new();
    for (gene_index, gene) in report.genes.iter().enumerate() {
        for position in &gene.variant_positions {
            for variant in &position.variant_amino_acids {
                for codon in &variant.variant_codons {
                    for drug in codon.known_drm.split('+').map(str::trim).filter(|d| !d.is_empty())
                    {
                        by_drug
                            .entry(drug.to_string())
                            .or_default()
                            .entry((gene_index, gene.name.as_str()))
                            .or_default()
                            .push(DrmHit {
                                ref_aa: position.ref_amino_acid,
                                ref_pos: position.ref_position,
                                cur_aa: variant.amino_acid,
                                frequency: codon.frequency,
                            });
                    }
                }
            }
        }
    }

    if by_drug.is_empty() {
        writeln!(out, "<p>No known drug-resistance mutations present.</p>")?;
        return Ok(());
    }

    writeln!(out, "<table class=\"drmview\">")?;
    writeln!(
        out,
        "<tr><th colspan=\"2\"></th><th colspan=\"2\">Reference</th><th colspan=\"2\">Sample</th></tr>"
    )?;
    writeln!(
        out,
        "<tr><th>Drug</th><th>Gene</th><th>AA</th><th>Pos</th><th>AA</th><th>%</th></tr>"
    )?;
    for (drug, genes) in &by_drug {
        let rows: usize = genes.values().map(Vec::len).sum();
        write!(out, "<tr><td rowspan=\"{rows}\">{}</td>", escape_html(drug))?;
        let mut first_in_drug = true;
        for ((_, gene), hits) in genes {
            if !first_in_drug {
                write!(out, "<tr>")?;
            }
            write!(out, "<td rowspan=\"{}\">{}</td>", hits.len(), escape_html(gene))?;
            for (i, hit) in hits.iter().enumerate() {
                if i > 0 {
                    write!(out, "<tr>")?;
                }
                writeln!(
                    out,
                    "<td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                    escape_html(&hit.ref_aa.to_string()),
                    hit.ref_pos,
                    escape_html(&hit.cur_aa.to_string()),
                    format_frequency(hit.frequency)
                )?;
            }
            first_in_drug = false;
        }
    }
    writeln!(out, "</table>")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::juliet::caller::{MsaCount, VariantAminoAcid, VariantCodon, VariantGene};
    use crate::juliet::phasing::HaplotypeReadCounts;
    use rstest::rstest;

    fn report_with_codon(known_drm: &str) -> JulietReport {
        let codon = VariantCodon {
            codon: "AAT".to_string(),
            frequency: 0.1234,
            p_value: 1e-5,
            known_drm: known_drm.to_string(),
            haplotype_hit: Vec::new(),
        };
        let position = VariantPosition {
            ref_codon: "AAA".to_string(),
            ref_amino_acid: 'K',
            alt_ref_codon: None,
            alt_ref_amino_acid: None,
            ref_position: 103,
            coverage: 500,
            msa: vec![MsaCount {
                rel_pos: 2,
                abs_pos: 10,
                a: 440,
                c: 0,
                g: 0,
                t: 60,
                gap: 0,
                n: 0,
                wt: 'A',
            }],
            variant_amino_acids: vec![VariantAminoAcid {
                amino_acid: 'N',
                variant_codons: vec![codon],
            }],
            window_pos: 0,
        };
        JulietReport {
            genes: vec![VariantGene {
                name: "<RT>".to_string(),
                variant_positions: vec![position],
            }],
            haplotypes: Vec::new(),
            haplotype_read_counts: HaplotypeReadCounts::default(),
        }
    }

    fn render(report: &JulietReport) -> String {
        let mut out = Vec::new();
        write_html(&mut out, report, &TargetConfig::default(), false, "in.bam", "juliet a&b")
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[rstest]
    #[case(0.1234, "12")]
    #[case(0.0123, "1.2")]
    #[case(1.0, "100")]
    #[case(0.5, "50")]
    #[case(0.0, "0")]
    fn test_format_frequency(#[case] frequency: f64, #[case] expected: &str) {
        assert_eq!(format_frequency(frequency), expected);
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape_html(r#"<a href="x">"#), "&lt;a href=&quot;x&quot;&gt;");
    }

    #[test]
    fn test_page_contents() {
        let html = render(&report_with_codon("NNRTI + EFV"));
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("juliet a&amp;b"));
        assert!(html.contains("&lt;RT&gt;"));
        assert!(!html.contains("<RT>"));
        assert!(html.contains("<td>103</td>"));
        assert!(html.contains("<b class=\"mutated\">T</b>"));
        assert!(html.contains("<td>NNRTI + EFV</td>"));
        assert!(html.contains("<td rowspan=\"1\">EFV</td>"));
        assert!(html.contains("<td rowspan=\"1\">NNRTI</td>"));
        assert!(html.trim_end().ends_with("</html>"));
    }

    #[test]
    fn test_no_drms() {
        let html = render(&report_with_codon(""));
        assert!(html.contains("No known drug-resistance mutations present."));
    }
}
