//! Generated PDFs for tests: blank A4 pages, no content streams.

use lopdf::{dictionary, Document, Object};
use std::path::Path;

pub fn blank_document(page_count: u32) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = (0..page_count)
        .map(|_| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            })
            .into()
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => i64::from(page_count),
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc
}

pub fn write_blank_pdf(path: &Path, page_count: u32) -> std::io::Result<()> {
    let mut doc = blank_document(page_count);
    doc.save(path).map_err(|err| std::io::Error::other(err.to_string()))?;
    Ok(())
}
