use anyhow::{bail, Context, Result};

/// One selectable scan option understood by the remote scanning service.
///
/// Ids are stable and shared with the backend; the flag text is informational
/// on the client side (the service maps ids back to flags itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionDescriptor {
    pub id: u16,
    pub flag: &'static str,
    pub requires_value: bool,
    pub placeholder: Option<&'static str>,
    pub description: &'static str,
}

/// A named, ordered group of options. Ordering matters only for display.
#[derive(Debug, Clone, Copy)]
pub struct OptionCategory {
    pub name: &'static str,
    pub options: &'static [OptionDescriptor],
}

const fn flag(id: u16, flag: &'static str, description: &'static str) -> OptionDescriptor {
    OptionDescriptor {
        id,
        flag,
        requires_value: false,
        placeholder: None,
        description,
    }
}

const fn valued(
    id: u16,
    flag: &'static str,
    placeholder: &'static str,
    description: &'static str,
) -> OptionDescriptor {
    OptionDescriptor {
        id,
        flag,
        requires_value: true,
        placeholder: Some(placeholder),
        description,
    }
}

const TARGET_SPEC: &[OptionDescriptor] = &[
    valued(1, "-iL", "hostlist.txt", "Input from list of hosts/networks"),
    valued(2, "-iR", "10", "Choose random targets"),
    valued(3, "--exclude", "192.168.1.1,192.168.1.2", "Exclude hosts/networks"),
    valued(4, "--excludefile", "exclude.txt", "Exclude list from file"),
];

const HOST_DISCOVERY: &[OptionDescriptor] = &[
    flag(10, "-sL", "List Scan - simply list targets to scan"),
    flag(11, "-sn", "Ping Scan - disable port scan"),
    flag(12, "-Pn", "Treat all hosts as online - skip host discovery"),
    valued(13, "-PS", "22,80,443", "TCP SYN discovery to given ports"),
    valued(14, "-PA", "80,443", "TCP ACK discovery to given ports"),
    valued(15, "-PU", "53,161", "UDP discovery to given ports"),
    flag(16, "-n", "Never do DNS resolution"),
    flag(17, "-R", "Always resolve DNS"),
    valued(18, "--dns-servers", "8.8.8.8,8.8.4.4", "Specify custom DNS servers"),
    flag(19, "--traceroute", "Trace hop path to each host"),
];

const SCAN_TECHNIQUES: &[OptionDescriptor] = &[
    flag(30, "-sS", "TCP SYN scan (Stealth)"),
    flag(31, "-sT", "TCP connect scan"),
    flag(32, "-sA", "TCP ACK scan"),
    flag(33, "-sW", "TCP Window scan"),
    flag(34, "-sM", "TCP Maimon scan"),
    flag(35, "-sU", "UDP scan"),
    flag(36, "-sN", "TCP Null scan"),
    flag(37, "-sF", "TCP FIN scan"),
    flag(38, "-sX", "TCP Xmas scan"),
    valued(39, "--scanflags", "URGACKPSHRSTSYNFIN", "Customize TCP scan flags"),
    valued(40, "-sI", "zombie.host.com", "Idle scan (zombie host)"),
];

const PORT_SPEC: &[OptionDescriptor] = &[
    valued(50, "-p", "22,80,443 or 1-1000", "Only scan specified ports"),
    valued(51, "--exclude-ports", "135,139,445", "Exclude specified ports"),
    flag(52, "-F", "Fast mode - scan fewer ports than default"),
    flag(53, "-r", "Scan ports sequentially - don't randomize"),
    valued(54, "--top-ports", "100", "Scan <number> most common ports"),
];

const SERVICE_VERSION: &[OptionDescriptor] = &[
    flag(70, "-sV", "Probe open ports to determine service/version info"),
    valued(71, "--version-intensity", "7", "Set version scan intensity (0-9)"),
    flag(72, "--version-light", "Limit to most likely probes (intensity 2)"),
    flag(73, "--version-all", "Try every single probe (intensity 9)"),
    flag(74, "--version-trace", "Show detailed version scan activity"),
];

const OS_DETECTION: &[OptionDescriptor] = &[
    flag(90, "-O", "Enable OS detection"),
    flag(91, "--osscan-limit", "Limit OS detection to promising targets"),
    flag(92, "--osscan-guess", "Guess OS more aggressively"),
];

const TIMING: &[OptionDescriptor] = &[
    valued(110, "-T", "4", "Set timing template (0-5)"),
    valued(111, "--host-timeout", "30m", "Give up on target after this time"),
    valued(112, "--min-rate", "100", "Send packets no slower than <number>/sec"),
    valued(113, "--max-rate", "1000", "Send packets no faster than <number>/sec"),
];

/// Scan-option categories, in display order. The output group is kept apart
/// because its format entries are mutually exclusive (see [`OUTPUT_FORMATS`]).
pub const CATEGORIES: &[OptionCategory] = &[
    OptionCategory { name: "Target Specification", options: TARGET_SPEC },
    OptionCategory { name: "Host Discovery", options: HOST_DISCOVERY },
    OptionCategory { name: "Scan Techniques", options: SCAN_TECHNIQUES },
    OptionCategory { name: "Port Specification", options: PORT_SPEC },
    OptionCategory { name: "Service/Version Detection", options: SERVICE_VERSION },
    OptionCategory { name: "OS Detection", options: OS_DETECTION },
    OptionCategory { name: "Timing & Performance", options: TIMING },
];

/// Mutually-exclusive output file formats. At most one may be chosen, and a
/// chosen format requires a filename.
pub const OUTPUT_FORMATS: &[OptionDescriptor] = &[
    valued(150, "-oN", "scan_result", "Normal output to file"),
    valued(151, "-oX", "scan_result", "XML output to file"),
    valued(152, "-oA", "scan_result", "Output in all formats"),
];

/// Independent output flags with no value and no mutual exclusion.
pub const OUTPUT_EXTRAS: &[OptionDescriptor] = &[
    flag(153, "-v", "Increase verbosity level"),
    flag(154, "--open", "Only show open ports"),
];

/// Look up a scan option (the seven categories, excluding the output group).
pub fn scan_option(id: u16) -> Option<&'static OptionDescriptor> {
    CATEGORIES
        .iter()
        .flat_map(|c| c.options.iter())
        .find(|o| o.id == id)
}

/// Look up any option in the catalog, including output formats and extras.
pub fn lookup(id: u16) -> Option<&'static OptionDescriptor> {
    scan_option(id)
        .or_else(|| OUTPUT_FORMATS.iter().find(|o| o.id == id))
        .or_else(|| OUTPUT_EXTRAS.iter().find(|o| o.id == id))
}

/// Numeric output-mode code the service reports for a chosen format id:
/// 1 = normal text, 2 = XML, 3 = all formats (XML retrievable).
pub fn output_mode(id: u16) -> Option<u8> {
    match id {
        150 => Some(1),
        151 => Some(2),
        152 => Some(3),
        _ => None,
    }
}

pub fn is_output_format(id: u16) -> bool {
    output_mode(id).is_some()
}

pub fn is_output_extra(id: u16) -> bool {
    OUTPUT_EXTRAS.iter().any(|o| o.id == id)
}

/// Parse a command-line option spec of the form `ID` or `ID=VALUE`.
///
/// The value part is kept verbatim (it may itself contain `=`). Whitespace
/// around the id is ignored.
pub fn parse_option_spec(s: &str) -> Result<(u16, Option<String>)> {
    let (id_part, value) = match s.split_once('=') {
        Some((id, v)) => (id, Some(v.to_string())),
        None => (s, None),
    };
    let id: u16 = id_part
        .trim()
        .parse()
        .with_context(|| format!("invalid option spec: {s} (expected ID or ID=VALUE)"))?;
    if lookup(id).is_none() {
        bail!("unknown option id: {id} (see --list-options)");
    }
    Ok((id, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_across_catalog() {
        let mut seen = std::collections::HashSet::new();
        let all = CATEGORIES
            .iter()
            .flat_map(|c| c.options.iter())
            .chain(OUTPUT_FORMATS)
            .chain(OUTPUT_EXTRAS);
        for opt in all {
            assert!(seen.insert(opt.id), "duplicate option id {}", opt.id);
        }
    }

    #[test]
    fn lookup_covers_all_groups() {
        assert_eq!(scan_option(70).unwrap().flag, "-sV");
        assert!(scan_option(150).is_none());
        assert_eq!(lookup(150).unwrap().flag, "-oN");
        assert_eq!(lookup(154).unwrap().flag, "--open");
        assert!(lookup(999).is_none());
    }

    #[test]
    fn output_modes_map_to_format_ids() {
        assert_eq!(output_mode(150), Some(1));
        assert_eq!(output_mode(151), Some(2));
        assert_eq!(output_mode(152), Some(3));
        assert_eq!(output_mode(70), None);
        assert!(is_output_extra(153));
        assert!(!is_output_extra(150));
    }

    #[test]
    fn parse_bare_id_and_valued_spec() {
        assert_eq!(parse_option_spec("70").unwrap(), (70, None));
        let (id, value) = parse_option_spec("50=22,80,443").unwrap();
        assert_eq!(id, 50);
        assert_eq!(value.as_deref(), Some("22,80,443"));
    }

    #[test]
    fn parse_keeps_equals_in_value() {
        let (id, value) = parse_option_spec("39=a=b").unwrap();
        assert_eq!(id, 39);
        assert_eq!(value.as_deref(), Some("a=b"));
    }

    #[test]
    fn parse_rejects_garbage_and_unknown_ids() {
        assert!(parse_option_spec("-sV").is_err());
        assert!(parse_option_spec("999").is_err());
        assert!(parse_option_spec("").is_err());
    }
}
