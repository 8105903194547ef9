#![allow(dead_code)]

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use collator_pdf::manifest::{Priority, RawRow, Row};

/// Build a synthetic source PDF with one page per marker text. Resources and
/// MediaBox live on the Pages node so page copies exercise attribute
/// inheritance.
pub fn build_source_pdf(page_texts: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in page_texts {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![100.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// All `Tj` string operands per page, in page order.
pub fn page_texts(bytes: &[u8]) -> Vec<Vec<String>> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .values()
        .map(|&page_id| {
            let content_bytes = doc.get_page_content(page_id).unwrap();
            let content = Content::decode(&content_bytes).unwrap();
            content
                .operations
                .iter()
                .filter(|op| op.operator == "Tj")
                .filter_map(|op| op.operands.first())
                .filter_map(|operand| match operand {
                    Object::String(text, _) => Some(String::from_utf8_lossy(text).into_owned()),
                    _ => None,
                })
                .collect()
        })
        .collect()
}

pub fn raw_row(pairs: &[(&str, &str)]) -> RawRow {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// A normalized row with sensible defaults for tests that only care about a
/// few fields.
pub fn row(source_id: &str, page_number: u32) -> Row {
    Row {
        source_id: source_id.to_string(),
        page_number,
        primary_date: "2024-01-01".to_string(),
        settlement_date: "2024-01-02".to_string(),
        doc_type: "General".to_string(),
        asset_class: "Other".to_string(),
        counterparty: "Unknown".to_string(),
        id: String::new(),
        value: 0.0,
        priority: Priority::Normal,
    }
}
