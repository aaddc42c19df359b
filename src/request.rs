use serde::Serialize;
use thiserror::Error;

use crate::selection::SelectionModel;

/// Rejections raised before any network activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("target must not be empty")]
    EmptyTarget,
    #[error("select at least one scan option")]
    NoOptionsSelected,
    #[error("output format requires a filename")]
    MissingOutputFilename,
}

/// One `{id, value?}` entry on the wire. The value key is omitted when the
/// option carries none; the service treats absent and null identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanOption {
    pub id: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// The request body for `/scan` and `/scan/async`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanRequest {
    pub target: String,
    pub options: Vec<ScanOption>,
}

/// Check a target/selection pair without building anything.
///
/// Scan options declared as requiring a value are accepted even with an
/// empty one; the service rejects those itself and the error is surfaced
/// like any other backend failure.
pub fn validate(target: &str, selection: &SelectionModel) -> Result<(), ValidationError> {
    if target.trim().is_empty() {
        return Err(ValidationError::EmptyTarget);
    }
    if selection.selected().is_empty() {
        // Output format and extra flags alone are not a scan.
        return Err(ValidationError::NoOptionsSelected);
    }
    if selection.output_format().is_some() && selection.output_filename().trim().is_empty() {
        return Err(ValidationError::MissingOutputFilename);
    }
    Ok(())
}

/// Validate, then assemble the request in its canonical order: scan options
/// as selected, then the output format carrying the filename, then each
/// extra flag. Empty option values are normalized to absent.
pub fn build(target: &str, selection: &SelectionModel) -> Result<ScanRequest, ValidationError> {
    validate(target, selection)?;

    let mut options = Vec::with_capacity(selection.total_selected());
    for opt in selection.selected() {
        options.push(ScanOption {
            id: opt.id,
            value: opt.value.clone().filter(|v| !v.is_empty()),
        });
    }
    if let Some(format) = selection.output_format() {
        options.push(ScanOption {
            id: format,
            value: Some(selection.output_filename().trim().to_string()),
        });
    }
    for &id in selection.extras() {
        options.push(ScanOption { id, value: None });
    }

    Ok(ScanRequest {
        target: target.trim().to_string(),
        options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection_with(ids: &[u16]) -> SelectionModel {
        let mut sel = SelectionModel::new();
        for &id in ids {
            sel.toggle(id, true, None);
        }
        sel
    }

    #[test]
    fn empty_target_rejected_first() {
        let sel = selection_with(&[70]);
        assert_eq!(validate("", &sel), Err(ValidationError::EmptyTarget));
        assert_eq!(validate("   ", &sel), Err(ValidationError::EmptyTarget));
    }

    #[test]
    fn at_least_one_scan_option_required() {
        let mut sel = SelectionModel::new();
        sel.set_output_format(Some(151));
        sel.set_output_filename("out");
        sel.toggle_extra(154);
        // format + extras do not count as scan options
        assert_eq!(validate("host", &sel), Err(ValidationError::NoOptionsSelected));
    }

    #[test]
    fn chosen_format_needs_filename() {
        let mut sel = selection_with(&[70]);
        sel.set_output_format(Some(151));
        assert_eq!(
            validate("host", &sel),
            Err(ValidationError::MissingOutputFilename)
        );

        sel.set_output_filename("  ");
        assert_eq!(
            validate("host", &sel),
            Err(ValidationError::MissingOutputFilename)
        );

        sel.set_output_filename("out");
        assert_eq!(validate("host", &sel), Ok(()));
    }

    #[test]
    fn required_value_options_pass_without_value() {
        // Permissive on purpose; the service enforces required inputs.
        let mut sel = SelectionModel::new();
        sel.toggle(50, true, None);
        assert_eq!(validate("host", &sel), Ok(()));
    }

    #[test]
    fn build_orders_options_then_format_then_extras() {
        let mut sel = SelectionModel::new();
        sel.toggle(70, true, None);
        sel.toggle(50, true, Some("1-1000".into()));
        sel.set_output_format(Some(151));
        sel.set_output_filename("result");
        sel.toggle_extra(153);
        sel.toggle_extra(154);

        let req = build("  scanme.nmap.org  ", &sel).unwrap();
        assert_eq!(req.target, "scanme.nmap.org");
        let ids: Vec<u16> = req.options.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![70, 50, 151, 153, 154]);
        assert_eq!(req.options[1].value.as_deref(), Some("1-1000"));
        assert_eq!(req.options[2].value.as_deref(), Some("result"));
        assert_eq!(req.options[3].value, None);
    }

    #[test]
    fn empty_values_serialize_as_absent() {
        let mut sel = SelectionModel::new();
        sel.toggle(70, true, Some(String::new()));
        let req = build("host", &sel).unwrap();
        assert_eq!(req.options[0].value, None);

        let body = serde_json::to_string(&req).unwrap();
        assert_eq!(body, r#"{"target":"host","options":[{"id":70}]}"#);
    }
}
