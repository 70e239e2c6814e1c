//! Synthetic resume PDFs for integration tests.

#![allow(dead_code)]

use lopdf::{dictionary, Document, Object, Stream};

/// Header band color of [`resume_page`], 0..120 from the top.
pub const HEADER_RGB: [f32; 3] = [0.12, 0.23, 0.35];

/// Icon drawn left of the phone line, in page space.
pub const PHONE_ICON: [f32; 4] = [56.0, 142.0, 66.0, 152.0];

/// First page of a typical resume: a colored header with the name and an
/// email, a phone line with an icon, a profile link, and body text.
pub fn resume_page() -> String {
    [
        "0.12 0.23 0.35 rg 0 672 612 120 re f",
        "1 1 1 rg BT /F1 20 Tf 72 740 Td (Jane Doe) Tj ET",
        "BT /F1 10 Tf 72 710 Td (Email: jane.doe@example.com) Tj ET",
        "0.5 0.5 0.5 rg 56 640 10 10 re f",
        "0 0 0 rg BT /F1 10 Tf 72 642 Td (+84 912 345 678) Tj ET",
        "BT /F1 10 Tf 72 626 Td (linkedin.com/in/janedoe) Tj ET",
        "BT /F1 12 Tf 72 580 Td (Experience) Tj ET",
        "BT /F1 10 Tf 72 560 Td (Built data pipelines at Example Corp.) Tj ET",
    ]
    .join("\n")
}

/// A follow-up page that repeats the email in a footer.
pub fn footer_page() -> String {
    [
        "0 0 0 rg BT /F1 10 Tf 72 700 Td (Projects) Tj ET",
        "BT /F1 10 Tf 72 60 Td (jane.doe@example.com) Tj ET",
    ]
    .join("\n")
}

/// Build a US Letter document with one page per content stream.
///
/// Every page shares a Helvetica font as `/F1`.
pub fn build_pdf(pages: &[String]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for content in pages {
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.as_bytes().to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("fixture serializes");
    bytes
}

/// Single-page resume.
pub fn resume_pdf() -> Vec<u8> {
    build_pdf(&[resume_page()])
}

/// Resume followed by a page with the email in its footer.
pub fn two_page_resume_pdf() -> Vec<u8> {
    build_pdf(&[resume_page(), footer_page()])
}

/// A single page whose only content is `/Fm1 Do`; the form draws `body`.
///
/// Some exporters wrap every page this way.
pub fn form_wrapped_pdf(body: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let media_box = vec![
        Object::Integer(0),
        Object::Integer(0),
        Object::Integer(612),
        Object::Integer(792),
    ];
    let form_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => media_box.clone(),
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        },
        body.as_bytes().to_vec(),
    ));
    let content_id = doc.add_object(Stream::new(dictionary! {}, b"q /Fm1 Do Q".to_vec()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => media_box,
        "Contents" => content_id,
        "Resources" => dictionary! { "XObject" => dictionary! { "Fm1" => form_id } },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("fixture serializes");
    bytes
}

/// Whether any stream in the file contains `needle`, after decompression.
pub fn any_stream_contains(pdf: &[u8], needle: &str) -> bool {
    let doc = Document::load_mem(pdf).expect("output parses");
    doc.objects.values().any(|obj| match obj {
        Object::Stream(stream) => {
            let data = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());
            data.windows(needle.len()).any(|w| w == needle.as_bytes())
        }
        _ => false,
    })
}
