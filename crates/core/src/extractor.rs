use crate::error::IngestError;
use crate::models::UploadedDocument;
use lopdf::Document;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor: Send + Sync {
    /// Page texts in page order. Pages without text come back as empty strings.
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;

            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        Ok(pages)
    }
}

/// Concatenates every page of every document, in document then page order,
/// with nothing between documents. The first unreadable document aborts the
/// whole extraction.
pub fn extract_text(
    extractor: &dyn PdfExtractor,
    documents: &[UploadedDocument],
) -> Result<String, IngestError> {
    let mut raw_text = String::new();

    for document in documents {
        let pages = extractor.extract_pages(&document.bytes).map_err(|error| match error {
            IngestError::PdfParse(reason) => {
                IngestError::PdfParse(format!("{}: {reason}", document.name))
            }
            other => other,
        })?;

        for page in pages {
            raw_text.push_str(&page.text);
        }
    }

    Ok(raw_text)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Treats the document bytes as UTF-8 with pages separated by form feeds.
    /// Documents whose bytes start with `!` fail to parse.
    #[derive(Default)]
    pub(crate) struct FormFeedExtractor;

    impl PdfExtractor for FormFeedExtractor {
        fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
            let text = String::from_utf8_lossy(bytes);
            if text.starts_with('!') {
                return Err(IngestError::PdfParse("not a pdf".to_string()));
            }
            Ok(text
                .split('\u{000c}')
                .enumerate()
                .map(|(index, page)| PageText {
                    number: index as u32 + 1,
                    text: page.to_string(),
                })
                .collect())
        }
    }

    #[test]
    fn empty_document_set_extracts_empty_text() {
        let text = extract_text(&FormFeedExtractor, &[]).expect("nothing to fail on");
        assert_eq!(text, "");
    }

    #[test]
    fn pages_are_concatenated_in_document_then_page_order() {
        let documents = vec![
            UploadedDocument::new("a.pdf", "one\u{000c}two"),
            UploadedDocument::new("b.pdf", ""),
            UploadedDocument::new("c.pdf", "three"),
        ];

        let text = extract_text(&FormFeedExtractor, &documents).expect("extraction should succeed");

        assert_eq!(text, "onetwothree");
        let page_lengths: usize = ["one", "two", "", "three"]
            .iter()
            .map(|page| page.chars().count())
            .sum();
        assert_eq!(text.chars().count(), page_lengths);
    }

    #[test]
    fn unreadable_document_aborts_and_is_named() {
        let documents = vec![
            UploadedDocument::new("good.pdf", "fine"),
            UploadedDocument::new("broken.pdf", "!garbage"),
        ];

        let error = extract_text(&FormFeedExtractor, &documents).unwrap_err();
        match error {
            IngestError::PdfParse(reason) => assert!(reason.starts_with("broken.pdf")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn lopdf_rejects_garbage_bytes() {
        let result = LopdfExtractor.extract_pages(b"%PDF-1.4\n%broken");
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
    }

    #[test]
    fn lopdf_reads_generated_document() {
        let bytes = tiny_pdf(&["Alpha line one", "Alpha line two"]);
        let pages = LopdfExtractor.extract_pages(&bytes).expect("generated pdf should parse");

        assert_eq!(pages.len(), 2);
        assert!(pages[0].text.contains("Alpha line one"));
        assert!(pages[1].text.contains("Alpha line two"));
    }

    /// Builds a minimal PDF with one line of Helvetica text per page.
    pub(crate) fn tiny_pdf(lines: &[&str]) -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for line in lines {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*line)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let encoded = content.encode().expect("content encodes");
            let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
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

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("pdf serializes");
        bytes
    }
}
