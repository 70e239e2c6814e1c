//! Integration tests for automatic redaction.

mod common;

use common::{
    any_stream_contains, form_wrapped_pdf, resume_page, resume_pdf, two_page_resume_pdf,
    HEADER_RGB, PHONE_ICON,
};
use cvmask::{
    auto_redact, auto_redact_file, auto_redact_with_options, auto_redact_with_report,
    DocumentProvider, FillColor, LopdfProvider, OverlapPolicy, PiiKind, RedactOptions, Rect,
    Redactor,
};

fn lines(pdf: &[u8], page: usize) -> Vec<String> {
    LopdfProvider::from_bytes(pdf)
        .unwrap()
        .text_lines(page)
        .unwrap()
        .into_iter()
        .map(|l| l.text)
        .collect()
}

#[test]
fn test_email_line_is_stripped_and_covered() {
    let input = resume_pdf();
    let email_rect = LopdfProvider::from_bytes(&input)
        .unwrap()
        .text_lines(0)
        .unwrap()
        .into_iter()
        .find(|l| l.text.contains('@'))
        .unwrap()
        .rect;

    let (output, report) = auto_redact_with_report(&input, &RedactOptions::default()).unwrap();

    assert!(report.covers(0, &email_rect));
    assert!(lines(&output, 0).iter().all(|l| !l.contains('@')));

    // The text must be gone from the file, not only hidden.
    let provider = LopdfProvider::from_bytes(&output).unwrap();
    assert!(provider.search(0, "example.com").unwrap().is_empty());
}

#[test]
fn test_contact_text_not_recoverable_from_bytes() {
    let output = auto_redact(&resume_pdf()).unwrap();
    assert!(!any_stream_contains(&output, "jane.doe"));
    assert!(!any_stream_contains(&output, "linkedin"));
    assert!(!any_stream_contains(&output, "+84 912"));
}

#[test]
fn test_body_text_survives() {
    let output = auto_redact(&resume_pdf()).unwrap();
    let remaining = lines(&output, 0);
    assert!(remaining.contains(&"Jane Doe".to_string()));
    assert!(remaining.contains(&"Experience".to_string()));
    assert!(remaining.contains(&"Built data pipelines at Example Corp.".to_string()));
}

#[test]
fn test_form_wrapped_page_keeps_body_text() {
    let input = form_wrapped_pdf(&resume_page());
    assert_eq!(lines(&input, 0).len(), 6);

    let output = auto_redact(&input).unwrap();
    let remaining = lines(&output, 0);
    assert!(remaining.contains(&"Jane Doe".to_string()));
    assert!(remaining.contains(&"Experience".to_string()));
    assert!(remaining.contains(&"Built data pipelines at Example Corp.".to_string()));
    assert!(remaining.iter().all(|l| !l.contains('@') && !l.contains("linkedin")));
}

#[test]
fn test_form_wrapped_contacts_not_recoverable_from_bytes() {
    let output = auto_redact(&form_wrapped_pdf(&resume_page())).unwrap();
    assert!(!any_stream_contains(&output, "jane.doe"));
    assert!(!any_stream_contains(&output, "linkedin"));
    assert!(!any_stream_contains(&output, "+84 912"));
    assert!(any_stream_contains(&output, "Experience"));
}

#[test]
fn test_report_counts_kinds() {
    let (_, report) = auto_redact_with_report(&resume_pdf(), &RedactOptions::default()).unwrap();
    assert_eq!(report.detections.get(&PiiKind::Email), Some(&1));
    assert_eq!(report.detections.get(&PiiKind::Phone), Some(&1));
    assert_eq!(report.detections.get(&PiiKind::ProfileLink), Some(&1));
    assert_eq!(report.keyword_hits, 1);
    assert_eq!(report.mask_count(), 4);
    assert!(report.skipped_boxes.is_empty());
}

#[test]
fn test_phone_icon_is_masked_and_removed() {
    let icon = Rect::new(PHONE_ICON[0], PHONE_ICON[1], PHONE_ICON[2], PHONE_ICON[3]);
    let (output, report) = auto_redact_with_report(&resume_pdf(), &RedactOptions::default()).unwrap();

    assert!(report.covers(0, &icon));
    let rects = LopdfProvider::from_bytes(&output).unwrap().vector_rects(0).unwrap();
    assert!(!rects.contains(&icon));
}

#[test]
fn test_icon_kept_when_graphics_ignored() {
    let icon = Rect::new(PHONE_ICON[0], PHONE_ICON[1], PHONE_ICON[2], PHONE_ICON[3]);
    let options = RedactOptions::new().with_graphics_policy(OverlapPolicy::Ignore);
    let output = auto_redact_with_options(&resume_pdf(), &options).unwrap();

    let rects = LopdfProvider::from_bytes(&output).unwrap().vector_rects(0).unwrap();
    assert!(rects.contains(&icon));
}

#[test]
fn test_header_mask_matches_band_color() {
    let (_, report) = auto_redact_with_report(&resume_pdf(), &RedactOptions::default()).unwrap();
    let expected = FillColor::new(HEADER_RGB[0], HEADER_RGB[1], HEADER_RGB[2]).to_rgb8();

    // The email line is the only contact line inside the header band.
    let (_, header_mask) = report.masks().find(|(_, m)| m.rect.y1 < 120.0).unwrap();
    let actual = header_mask.color.to_rgb8();
    for (a, e) in actual.iter().zip(expected) {
        assert!((*a as i16 - e as i16).abs() <= 1, "{:?} vs {:?}", actual, expected);
    }
}

#[test]
fn test_later_pages_untouched_by_default() {
    let input = two_page_resume_pdf();
    let output = auto_redact(&input).unwrap();
    assert!(lines(&output, 1).iter().any(|l| l.contains("jane.doe@example.com")));
    assert_eq!(lines(&output, 1), lines(&input, 1));
}

#[test]
fn test_all_pages_scope() {
    let output = auto_redact_with_options(&two_page_resume_pdf(), &RedactOptions::new().all_pages())
        .unwrap();
    assert!(lines(&output, 1).iter().all(|l| !l.contains('@')));
    assert!(lines(&output, 1).contains(&"Projects".to_string()));
}

#[test]
fn test_custom_keywords() {
    let result = Redactor::new()
        .with_keywords(["example corp"])
        .auto(&resume_pdf())
        .unwrap();
    let remaining = lines(result.bytes(), 0);
    assert!(!remaining.iter().any(|l| l.contains("Example Corp")));
    // linkedin.com is no longer a keyword
    assert!(remaining.iter().any(|l| l.contains("linkedin.com")));
}

#[test]
fn test_sequential_matches_parallel() {
    let input = resume_pdf();
    let (_, parallel) = auto_redact_with_report(&input, &RedactOptions::default()).unwrap();
    let (_, sequential) = auto_redact_with_report(&input, &RedactOptions::new().sequential()).unwrap();
    assert_eq!(parallel, sequential);
}

#[test]
fn test_document_without_contacts_is_unchanged_in_text() {
    let input = common::build_pdf(&["BT /F1 10 Tf 72 700 Td (Nothing to see) Tj ET".to_string()]);
    let (output, report) = auto_redact_with_report(&input, &RedactOptions::default()).unwrap();
    assert_eq!(report.mask_count(), 0);
    assert_eq!(lines(&output, 0), vec!["Nothing to see".to_string()]);
}

#[test]
fn test_auto_redact_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("resume.pdf");
    let output = dir.path().join("resume.redacted.pdf");
    std::fs::write(&input, resume_pdf()).unwrap();

    let report = auto_redact_file(&input, &output).unwrap();
    assert_eq!(report.mask_count(), 4);
    let written = std::fs::read(&output).unwrap();
    assert!(cvmask::is_pdf_bytes(&written));
}

#[test]
fn test_garbage_input_fails() {
    assert!(auto_redact(b"definitely not a pdf").is_err());
}
