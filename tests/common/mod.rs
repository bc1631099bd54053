//! In-memory PDF builders shared by the integration tests
#![allow(dead_code)]

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

/// Show each `(text, x, y)` in 12pt Helvetica
pub fn text_ops(lines: &[(&str, f32, f32)]) -> Vec<Operation> {
    let mut ops = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 12.into()]),
    ];
    for (text, x, y) in lines {
        ops.push(Operation::new(
            "Tm",
            vec![1.into(), 0.into(), 0.into(), 1.into(), (*x).into(), (*y).into()],
        ));
        ops.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
    }
    ops.push(Operation::new("ET", vec![]));
    ops
}

/// Stroke straight lines between the given point pairs
pub fn line_ops(lines: &[((f32, f32), (f32, f32))]) -> Vec<Operation> {
    let mut ops = Vec::new();
    for ((x0, y0), (x1, y1)) in lines {
        ops.push(Operation::new("m", vec![(*x0).into(), (*y0).into()]));
        ops.push(Operation::new("l", vec![(*x1).into(), (*y1).into()]));
        ops.push(Operation::new("S", vec![]));
    }
    ops
}

/// A page of one line of body text
pub fn simple_page(text: &str) -> Vec<Operation> {
    text_ops(&[(text, 72.0, 700.0)])
}

/// An A4 document with one content stream per page
pub fn build_document(pages: Vec<Vec<Operation>>) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let kids: Vec<Object> = pages
        .into_iter()
        .map(|operations| {
            let content = Content { operations };
            let stream = Stream::new(dictionary! {}, content.encode().unwrap());
            let content_id = doc.add_object(stream);
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            })
            .into()
        })
        .collect();

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

pub fn save(mut doc: Document) -> Vec<u8> {
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// Serialize an A4 document with one content stream per page
pub fn build_pdf(pages: Vec<Vec<Operation>>) -> Vec<u8> {
    save(build_document(pages))
}

/// How the middle page of [`pdf_with_broken_middle_page`] is damaged
#[derive(Debug, Clone, Copy)]
pub enum Breakage {
    /// `Contents` points at an object that does not exist
    MissingStream,
    /// `Contents` is a stream of bytes that are not PDF operators
    GarbageStream,
}

/// Three numbered pages whose second page cannot be read
pub fn pdf_with_broken_middle_page(breakage: Breakage) -> Vec<u8> {
    let mut doc = build_document(
        (1..=3)
            .map(|n| simple_page(&format!("This is the body of page {}", n)))
            .collect(),
    );
    let page_id = doc.get_pages()[&2];
    let contents: Object = match breakage {
        Breakage::MissingStream => Object::Reference((9999, 0)),
        Breakage::GarbageStream => doc
            .add_object(Stream::new(dictionary! {}, b"\x00\xff{{ ]] >>".to_vec()))
            .into(),
    };
    doc.get_dictionary_mut(page_id)
        .unwrap()
        .set("Contents", contents);
    save(doc)
}

/// A one-page document carrying a Standard security handler entry
pub fn encrypted_pdf() -> Vec<u8> {
    let mut doc = build_document(vec![simple_page("Confidential body text")]);
    let encrypt_id = doc.add_object(dictionary! {
        "Filter" => "Standard",
        "V" => 1,
        "R" => 2,
        "O" => Object::string_literal(vec![0u8; 32]),
        "U" => Object::string_literal(vec![0u8; 32]),
        "P" => -4,
    });
    doc.trailer.set("Encrypt", encrypt_id);
    save(doc)
}

/// `count` pages, each saying which page it is
pub fn numbered_pdf(count: usize) -> Vec<u8> {
    build_pdf(
        (1..=count)
            .map(|n| simple_page(&format!("This is the body of page {}", n)))
            .collect(),
    )
}

/// A ruled two-by-two table followed by a paragraph
pub fn ruled_table_page() -> Vec<Operation> {
    let mut ops = line_ops(&[
        ((100.0, 500.0), (100.0, 620.0)),
        ((250.0, 500.0), (250.0, 620.0)),
        ((400.0, 500.0), (400.0, 620.0)),
        ((100.0, 500.0), (400.0, 500.0)),
        ((100.0, 560.0), (400.0, 560.0)),
        ((100.0, 620.0), (400.0, 620.0)),
    ]);
    ops.extend(text_ops(&[
        ("Region", 110.0, 590.0),
        ("Revenue", 260.0, 590.0),
        ("North", 110.0, 530.0),
        ("1250000", 260.0, 530.0),
        ("This paragraph follows the table.", 100.0, 400.0),
    ]));
    ops
}
