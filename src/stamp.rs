use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId};

use crate::config::{
    RunConfig, StampColor, StampPosition, ANNOTATION_BOTTOM_Y, ANNOTATION_GRAY, ANNOTATION_OFFSET_X,
    ANNOTATION_OFFSET_Y, CHAR_WIDTH, STAMP_MARGIN_X, STAMP_MARGIN_Y, TOP_DROP,
};
use crate::error::PipelineError;
use crate::manifest::Row;

/// Resource names the stamp fonts are registered under on each page.
const BOLD_FONT_RESOURCE: &str = "StampBold";
const META_FONT_RESOURCE: &str = "StampMeta";

/// Metadata annotation font size, smaller and lighter than the identifier.
const ANNOTATION_FONT_SIZE: f32 = 7.0;

/// Fallback page size (US Letter) when a page carries no MediaBox at all.
const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

/// The two standard fonts a composite embeds for stamping, created once per
/// composite document and shared by every stamped page.
#[derive(Debug, Clone, Copy)]
pub struct StampFonts {
    /// Helvetica-Bold, identifier stamp.
    pub bold: ObjectId,
    /// Helvetica, metadata annotation.
    pub regular: ObjectId,
}

impl StampFonts {
    pub fn embed(document: &mut Document) -> Self {
        let bold = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
        });
        let regular = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        StampFonts { bold, regular }
    }
}

/// Render the identifier text for a sequence number: prefix plus the number
/// zero-padded to `digits`. Numbers past `10^digits` print in full rather
/// than being truncated.
pub fn format_stamp_text(prefix: &str, sequence_number: u64, digits: u32) -> String {
    format!("{prefix}{sequence_number:0width$}", width = digits as usize)
}

/// Anchor coordinates for the identifier stamp.
///
/// The horizontal extent is approximated as `text_len * CHAR_WIDTH`, keeping
/// the stamp's outer edge a fixed margin from the page edge regardless of
/// string length. Top anchors drop a further [`TOP_DROP`] below the margin.
pub fn stamp_anchor(
    position: StampPosition,
    width: f32,
    height: f32,
    text_len: usize,
) -> (f32, f32) {
    let text_width = text_len as f32 * CHAR_WIDTH;

    let x = match position {
        StampPosition::TopLeft | StampPosition::BottomLeft => STAMP_MARGIN_X,
        StampPosition::TopRight | StampPosition::BottomRight => width - text_width - STAMP_MARGIN_X,
        StampPosition::TopCenter | StampPosition::BottomCenter => (width - text_width) / 2.0,
    };
    let y = if position.is_top() {
        height - STAMP_MARGIN_Y - TOP_DROP
    } else {
        STAMP_MARGIN_Y
    };

    (x, y)
}

/// Anchor coordinates for the metadata annotation: the corner diagonally
/// opposite the identifier stamp, so the two never collide.
pub fn annotation_anchor(position: StampPosition, width: f32, height: f32) -> (f32, f32) {
    let x = if position.is_right() {
        ANNOTATION_OFFSET_X / 10.0
    } else {
        width - ANNOTATION_OFFSET_X
    };
    let y = if position.is_top() {
        ANNOTATION_BOTTOM_Y
    } else {
        height - ANNOTATION_OFFSET_Y
    };
    (x, y)
}

/// Draw the identifier stamp for `sequence_number` onto a page.
///
/// The stamper holds no counter state; the caller supplies the number, which
/// is what makes group-level parallelism safe.
pub fn stamp_identifier(
    document: &mut Document,
    page_id: ObjectId,
    fonts: &StampFonts,
    config: &RunConfig,
    sequence_number: u64,
) -> Result<(), PipelineError> {
    let text = format_stamp_text(&config.prefix, sequence_number, config.digits);
    let (width, height) = page_size(document, page_id);
    let (x, y) = stamp_anchor(config.position, width, height, text.len());

    draw_text(
        document,
        page_id,
        BOLD_FONT_RESOURCE,
        fonts.bold,
        config.stamp_font_size,
        config.stamp_color,
        x,
        y,
        &text,
    )
}

/// Draw the metadata annotation (`Doc: <id-or-N/A> | Date: <date>`) at the
/// corner opposite the identifier stamp. Skipped entirely when the row has
/// neither an id nor a date.
pub fn stamp_metadata(
    document: &mut Document,
    page_id: ObjectId,
    fonts: &StampFonts,
    position: StampPosition,
    row: &Row,
) -> Result<(), PipelineError> {
    if row.id.is_empty() && row.primary_date.is_empty() {
        return Ok(());
    }

    let id = if row.id.is_empty() { "N/A" } else { &row.id };
    let text = format!("Doc: {id} | Date: {}", row.primary_date);

    let (width, height) = page_size(document, page_id);
    let (x, y) = annotation_anchor(position, width, height);

    draw_text(
        document,
        page_id,
        META_FONT_RESOURCE,
        fonts.regular,
        ANNOTATION_FONT_SIZE,
        ANNOTATION_GRAY,
        x,
        y,
        &text,
    )
}

/// Append one positioned text draw as an extra content stream on the page,
/// registering the font in the page's resources. Page dimensions and
/// existing content are untouched.
#[allow(clippy::too_many_arguments)]
fn draw_text(
    document: &mut Document,
    page_id: ObjectId,
    font_resource: &str,
    font_id: ObjectId,
    font_size: f32,
    color: StampColor,
    x: f32,
    y: f32,
    text: &str,
) -> Result<(), PipelineError> {
    let operations = vec![
        Operation::new("q", vec![]),
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![font_resource.into(), font_size.into()],
        ),
        Operation::new("rg", vec![color.r.into(), color.g.into(), color.b.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::string_literal(text)]),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
    ];
    let content = Content { operations };
    let stream_id = document.add_object(lopdf::Stream::new(dictionary! {}, content.encode()?));

    register_font(document, page_id, font_resource, font_id)?;
    append_content(document, page_id, stream_id)?;
    Ok(())
}

/// Both `Resources` and its `Font` entry may be inline dictionaries or
/// references to shared objects; either way the stamp font ends up
/// registered under `resource_name`.
fn register_font(
    document: &mut Document,
    page_id: ObjectId,
    resource_name: &str,
    font_id: ObjectId,
) -> Result<(), PipelineError> {
    let resources_id = {
        let page = document.get_dictionary(page_id)?;
        match page.get(b"Resources") {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        }
    };

    if resources_id.is_none() {
        let page = document.get_object_mut(page_id)?.as_dict_mut()?;
        if !page.has(b"Resources") {
            page.set("Resources", dictionary! {});
        }
    }

    let font_dict_id = {
        let resources = match resources_id {
            Some(id) => document.get_object_mut(id)?.as_dict_mut()?,
            None => document
                .get_object_mut(page_id)?
                .as_dict_mut()?
                .get_mut(b"Resources")?
                .as_dict_mut()?,
        };
        if !resources.has(b"Font") {
            resources.set("Font", dictionary! {});
        }
        match resources.get(b"Font")? {
            Object::Reference(id) => Some(*id),
            _ => None,
        }
    };

    let fonts = match font_dict_id {
        Some(id) => document.get_object_mut(id)?.as_dict_mut()?,
        None => {
            let resources = match resources_id {
                Some(id) => document.get_object_mut(id)?.as_dict_mut()?,
                None => document
                    .get_object_mut(page_id)?
                    .as_dict_mut()?
                    .get_mut(b"Resources")?
                    .as_dict_mut()?,
            };
            resources.get_mut(b"Font")?.as_dict_mut()?
        }
    };
    fonts.set(resource_name, Object::Reference(font_id));
    Ok(())
}

fn append_content(
    document: &mut Document,
    page_id: ObjectId,
    stream_id: ObjectId,
) -> Result<(), PipelineError> {
    let existing = document
        .get_dictionary(page_id)?
        .get(b"Contents")
        .ok()
        .cloned();

    let contents = match existing {
        Some(Object::Array(mut items)) => {
            items.push(Object::Reference(stream_id));
            items
        }
        Some(Object::Reference(id)) => match document.get_object(id) {
            Ok(Object::Array(items)) => {
                let mut items = items.clone();
                items.push(Object::Reference(stream_id));
                items
            }
            _ => vec![Object::Reference(id), Object::Reference(stream_id)],
        },
        Some(other) => vec![other, Object::Reference(stream_id)],
        None => vec![Object::Reference(stream_id)],
    };

    let page = document.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Contents", contents);
    Ok(())
}

/// Page width and height from its MediaBox; the builder resolves inherited
/// boxes down onto the page during copy, so this is a direct read.
fn page_size(document: &Document, page_id: ObjectId) -> (f32, f32) {
    let media_box = document
        .get_dictionary(page_id)
        .ok()
        .and_then(|page| page.get(b"MediaBox").ok())
        .and_then(|obj| resolve_array(document, obj));

    match media_box.as_deref() {
        Some([x0, y0, x1, y1]) => {
            let x0 = number(x0).unwrap_or(0.0);
            let y0 = number(y0).unwrap_or(0.0);
            let x1 = number(x1).unwrap_or(DEFAULT_PAGE_SIZE.0);
            let y1 = number(y1).unwrap_or(DEFAULT_PAGE_SIZE.1);
            (x1 - x0, y1 - y0)
        }
        _ => DEFAULT_PAGE_SIZE,
    }
}

fn resolve_array(document: &Document, object: &Object) -> Option<Vec<Object>> {
    match object {
        Object::Array(items) => Some(items.clone()),
        Object::Reference(id) => match document.get_object(*id).ok()? {
            Object::Array(items) => Some(items.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}
