//! # Bitmap Font Engine
//!
//! Renders text with fixed 1-bit glyph bitmaps produced offline by the font
//! asset generator. A font is a table of named glyphs; plain characters are
//! looked up by themselves (`"A"`, `"ü"`), special symbols by an arbitrary
//! name referenced inline as `{{NAME}}` (see [`crate::escape`]).
//!
//! ## Glyph Encoding
//! Each glyph stores `width * height` bits, row-major, most significant bit
//! first, as one continuous stream (rows are not byte aligned). A set bit is
//! painted in the foreground value, a cleared bit in the background value.
//!
//! ## Caching
//! Decoding unpacks bits into one byte per pixel, which is far cheaper to
//! blit repeatedly. Decoded glyphs are memoized per name for the lifetime of
//! the engine; fonts never change at runtime so the cache is never
//! invalidated. [`Preload::All`] decodes the whole table up front and drops
//! the packed bitmaps afterwards to give the memory back.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use embedded_graphics::{pixelcolor::BinaryColor, prelude::*};
use log::{debug, info};
use serde::Deserialize;
use thiserror::Error;

use crate::escape::{EscapeError, EscapeParser, Token};

/// Name of the glyph drawn for anything the table does not contain.
pub const UNKNOWN_GLYPH: &str = "UNKNOWN";

#[derive(Error, Debug)]
pub enum FontError {
    #[error("font table has no \"{UNKNOWN_GLYPH}\" glyph")]
    MissingUnknown,

    #[error("glyph {name:?} needs {expected} bitmap bytes, got {actual}")]
    TruncatedGlyph {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Escape(#[from] EscapeError),

    #[error("font asset IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("font asset format: {0}")]
    Format(#[from] serde_json::Error),
}

/// A packed 1-bit glyph as produced by the asset generator.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Glyph {
    pub width: u16,
    pub height: u16,
    pub bitmap: Vec<u8>,
}

impl Glyph {
    fn packed_len(&self) -> usize {
        (self.width as usize * self.height as usize).div_ceil(8)
    }

    fn unpack(&self, foreground: u8, background: u8) -> GlyphBitmap {
        let count = self.width as usize * self.height as usize;
        let pixels = (0..count)
            .map(|bit| {
                let byte = self.bitmap[bit / 8];
                if byte & (0x80 >> (bit % 8)) != 0 {
                    foreground
                } else {
                    background
                }
            })
            .collect();

        GlyphBitmap {
            width: self.width,
            height: self.height,
            pixels,
        }
    }
}

/// A decoded glyph: one pixel value per byte, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlyphBitmap {
    width: u16,
    height: u16,
    pixels: Vec<u8>,
}

impl GlyphBitmap {
    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn pixel(&self, x: u16, y: u16) -> u8 {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Iterate `(x, y, value)` over every pixel.
    pub fn pixels(&self) -> impl Iterator<Item = (i32, i32, u8)> + '_ {
        let width = self.width.max(1) as usize;
        self.pixels
            .iter()
            .enumerate()
            .map(move |(i, &v)| ((i % width) as i32, (i / width) as i32, v))
    }
}

/// Immutable glyph table. Always contains [`UNKNOWN_GLYPH`].
#[derive(Clone, Debug)]
pub struct FontTable {
    glyphs: HashMap<String, Glyph>,
    line_height: u16,
}

impl FontTable {
    pub fn new(glyphs: HashMap<String, Glyph>) -> Result<Self, FontError> {
        if !glyphs.contains_key(UNKNOWN_GLYPH) {
            return Err(FontError::MissingUnknown);
        }

        for (name, glyph) in &glyphs {
            if glyph.bitmap.len() < glyph.packed_len() {
                return Err(FontError::TruncatedGlyph {
                    name: name.clone(),
                    expected: glyph.packed_len(),
                    actual: glyph.bitmap.len(),
                });
            }
        }

        let line_height = glyphs.values().map(|g| g.height).max().unwrap_or(0);
        Ok(Self {
            glyphs,
            line_height,
        })
    }

    /// Parse a JSON glyph asset: `{"A": {"width": 8, "height": 12, "bitmap": [..]}, ..}`.
    pub fn from_json(json: &str) -> Result<Self, FontError> {
        let glyphs: HashMap<String, Glyph> = serde_json::from_str(json)?;
        Self::new(glyphs)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FontError> {
        let contents = fs::read_to_string(&path)?;
        let table = Self::from_json(&contents)?;
        info!(
            "loaded {} glyphs from {} (line height {})",
            table.len(),
            path.as_ref().display(),
            table.line_height
        );
        Ok(table)
    }

    pub fn line_height(&self) -> u16 {
        self.line_height
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Glyph> {
        self.glyphs.get(name)
    }
}

/// Which glyphs to decode when the engine is built.
#[derive(Clone, Debug, Default)]
pub enum Preload {
    /// Decode lazily on first use.
    #[default]
    None,
    /// Decode everything now and drop the packed table.
    All,
    /// Decode these glyph names now, the rest lazily.
    Glyphs(Vec<String>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Align {
    #[default]
    Left,
    Right,
    Center,
}

/// Area covered by a drawn string, `x1`/`y1` exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl BoundingBox {
    pub fn width(&self) -> i32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> i32 {
        self.y1 - self.y0
    }
}

/// Anything glyphs can be blitted onto.
///
/// `key` is the transparent color: pixels equal to it are skipped.
pub trait Canvas {
    fn blit(&mut self, bitmap: &GlyphBitmap, x: i32, y: i32, key: Option<u8>);
}

impl<T> Canvas for T
where
    T: DrawTarget<Color = BinaryColor>,
{
    fn blit(&mut self, bitmap: &GlyphBitmap, x: i32, y: i32, key: Option<u8>) {
        let pixels = bitmap
            .pixels()
            .filter(|&(_, _, value)| Some(value) != key)
            .map(|(px, py, value)| {
                let color = if value != 0 {
                    BinaryColor::On
                } else {
                    BinaryColor::Off
                };
                Pixel(Point::new(x + px, y + py), color)
            });
        self.draw_iter(pixels).ok();
    }
}

/// Canvas used by measuring passes.
struct NullCanvas;

impl Canvas for NullCanvas {
    fn blit(&mut self, _bitmap: &GlyphBitmap, _x: i32, _y: i32, _key: Option<u8>) {}
}

/// Lays out, measures, and draws text with one [`FontTable`].
pub struct FontEngine {
    glyphs: HashMap<String, Glyph>,
    cache: HashMap<String, Rc<GlyphBitmap>>,
    unknown: Rc<GlyphBitmap>,
    line_height: u16,
    foreground: u8,
    background: u8,
}

impl FontEngine {
    pub fn new(table: FontTable, preload: Preload, foreground: u8, background: u8) -> Self {
        let FontTable {
            glyphs,
            line_height,
        } = table;

        // FontTable::new guarantees the entry exists
        let unknown = Rc::new(glyphs[UNKNOWN_GLYPH].unpack(foreground, background));

        let mut engine = Self {
            glyphs,
            cache: HashMap::new(),
            unknown,
            line_height,
            foreground,
            background,
        };

        match preload {
            Preload::None => {}
            Preload::All => {
                let names: Vec<String> = engine.glyphs.keys().cloned().collect();
                for name in &names {
                    engine.decode_name(name);
                }
                engine.glyphs = HashMap::new();
                debug!("font cache preheated with {} glyphs", engine.cache.len());
            }
            Preload::Glyphs(names) => {
                for name in &names {
                    engine.decode_name(name);
                }
                debug!("font cache preheated with {} glyphs", engine.cache.len());
            }
        }

        engine
    }

    pub fn line_height(&self) -> u16 {
        self.line_height
    }

    pub fn foreground(&self) -> u8 {
        self.foreground
    }

    pub fn background(&self) -> u8 {
        self.background
    }

    /// Number of decoded glyphs held in the cache.
    pub fn cached_glyphs(&self) -> usize {
        self.cache.len()
    }

    /// Decode the glyph for `ch`, falling back to [`UNKNOWN_GLYPH`].
    pub fn decode(&mut self, ch: char) -> Rc<GlyphBitmap> {
        let mut buf = [0u8; 4];
        self.decode_name(ch.encode_utf8(&mut buf))
    }

    /// Decode a glyph by table name, falling back to [`UNKNOWN_GLYPH`].
    pub fn decode_name(&mut self, name: &str) -> Rc<GlyphBitmap> {
        if let Some(bitmap) = self.cache.get(name) {
            return Rc::clone(bitmap);
        }

        let bitmap = match self.glyphs.get(name) {
            Some(glyph) => Rc::new(glyph.unpack(self.foreground, self.background)),
            None => {
                debug!("no glyph named {name:?}, drawing {UNKNOWN_GLYPH}");
                Rc::clone(&self.unknown)
            }
        };
        self.cache.insert(name.to_owned(), Rc::clone(&bitmap));
        bitmap
    }

    /// Width and height `text` would occupy. Height is always the line height.
    pub fn measure(&mut self, text: &str) -> Result<(i32, i32), FontError> {
        let bounds = self.layout(&mut NullCanvas, text, 0, 0, false)?;
        Ok((bounds.width(), bounds.height()))
    }

    /// Draw `text` so that `x` is its left edge, right edge, or center per `align`.
    ///
    /// With `transparent` set, background pixels of each glyph are left as
    /// they are on the target.
    pub fn draw<C: Canvas + ?Sized>(
        &mut self,
        target: &mut C,
        text: &str,
        x: i32,
        y: i32,
        align: Align,
        transparent: bool,
    ) -> Result<BoundingBox, FontError> {
        let start_x = match align {
            Align::Left => x,
            Align::Right => x - self.measure(text)?.0,
            Align::Center => x - self.measure(text)?.0 / 2,
        };
        self.layout(target, text, start_x, y, transparent)
    }

    fn layout<C: Canvas + ?Sized>(
        &mut self,
        target: &mut C,
        text: &str,
        x: i32,
        y: i32,
        transparent: bool,
    ) -> Result<BoundingBox, FontError> {
        let key = transparent.then_some(self.background);
        let mut parser = EscapeParser::new();
        let mut cursor = x;

        for ch in text.chars() {
            let bitmap = match parser.feed(ch)? {
                None => continue,
                Some(Token::Literal(c)) => self.decode(c),
                Some(Token::Named(name)) => self.decode_name(&name),
            };
            target.blit(&bitmap, cursor, y, key);
            cursor += i32::from(bitmap.width());
        }
        parser.finish()?;

        Ok(BoundingBox {
            x0: x,
            y0: y,
            x1: cursor,
            y1: y + i32::from(self.line_height),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Solid glyph of the given size.
    pub(crate) fn solid(width: u16, height: u16) -> Glyph {
        let len = (width as usize * height as usize).div_ceil(8);
        Glyph {
            width,
            height,
            bitmap: vec![0xFF; len],
        }
    }

    /// a=3, b=4, {=2, H/E/L/O=5, SUN=10, UNKNOWN=7x9; line height 12.
    pub(crate) fn test_table() -> FontTable {
        let mut glyphs = HashMap::new();
        glyphs.insert("a".to_string(), solid(3, 10));
        glyphs.insert("b".to_string(), solid(4, 10));
        glyphs.insert("{".to_string(), solid(2, 10));
        for c in ["H", "E", "L", "O"] {
            glyphs.insert(c.to_string(), solid(5, 10));
        }
        glyphs.insert("SUN".to_string(), solid(10, 12));
        glyphs.insert(UNKNOWN_GLYPH.to_string(), solid(7, 9));
        FontTable::new(glyphs).unwrap()
    }

    fn engine() -> FontEngine {
        FontEngine::new(test_table(), Preload::None, 1, 0)
    }

    /// Records where each glyph landed.
    #[derive(Default)]
    struct Recorder {
        blits: Vec<(i32, u16)>,
    }

    impl Canvas for Recorder {
        fn blit(&mut self, bitmap: &GlyphBitmap, x: i32, _y: i32, _key: Option<u8>) {
            self.blits.push((x, bitmap.width()));
        }
    }

    #[test]
    fn table_without_unknown_is_rejected() {
        let mut glyphs = HashMap::new();
        glyphs.insert("a".to_string(), solid(3, 10));
        assert!(matches!(
            FontTable::new(glyphs),
            Err(FontError::MissingUnknown)
        ));
    }

    #[test]
    fn truncated_bitmap_is_rejected() {
        let mut glyphs = HashMap::new();
        glyphs.insert(UNKNOWN_GLYPH.to_string(), solid(4, 4));
        glyphs.insert(
            "x".to_string(),
            Glyph {
                width: 8,
                height: 2,
                bitmap: vec![0xFF],
            },
        );
        assert!(matches!(
            FontTable::new(glyphs),
            Err(FontError::TruncatedGlyph { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn line_height_is_tallest_glyph() {
        assert_eq!(test_table().line_height(), 12);
    }

    #[test]
    fn decode_unpacks_msb_first_continuous_rows() {
        let mut glyphs = HashMap::new();
        glyphs.insert(UNKNOWN_GLYPH.to_string(), solid(1, 1));
        glyphs.insert(
            "x".to_string(),
            Glyph {
                width: 3,
                height: 2,
                bitmap: vec![0b1010_1100],
            },
        );
        let mut engine = FontEngine::new(FontTable::new(glyphs).unwrap(), Preload::None, 7, 2);
        let bitmap = engine.decode('x');
        let values: Vec<u8> = bitmap.pixels().map(|(_, _, v)| v).collect();
        assert_eq!(values, vec![7, 2, 7, 2, 7, 7]);
        assert_eq!(bitmap.pixel(2, 1), 7);
    }

    #[test]
    fn unknown_character_measures_as_unknown() {
        let mut engine = engine();
        assert_eq!(engine.measure("?").unwrap(), (7, 12));
        let bitmap = engine.decode('?');
        assert_eq!((bitmap.width(), bitmap.height()), (7, 9));
    }

    #[test]
    fn decoded_glyphs_are_memoized() {
        let mut engine = engine();
        let first = engine.decode('a');
        let second = engine.decode('a');
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(engine.cached_glyphs(), 1);
    }

    #[test]
    fn drawing_twice_gives_same_bounds() {
        let mut engine = engine();
        let mut canvas = Recorder::default();
        let first = engine.draw(&mut canvas, "a", 5, 5, Align::Left, false).unwrap();
        let second = engine.draw(&mut canvas, "a", 5, 5, Align::Left, false).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn named_glyph_draws_in_order() {
        let mut engine = engine();
        let mut canvas = Recorder::default();
        let bounds = engine
            .draw(&mut canvas, "a{{SUN}}b", 0, 0, Align::Left, false)
            .unwrap();
        assert_eq!(canvas.blits, vec![(0, 3), (3, 10), (13, 4)]);
        assert_eq!(bounds.width(), 3 + 10 + 4);
    }

    #[test]
    fn single_open_brace_draws_following_char_only() {
        let mut engine = engine();
        let mut canvas = Recorder::default();
        engine
            .draw(&mut canvas, "a{b", 0, 0, Align::Left, false)
            .unwrap();
        assert_eq!(canvas.blits, vec![(0, 3), (3, 4)]);
    }

    #[test]
    fn unterminated_escape_is_an_error() {
        let mut engine = engine();
        let err = engine.measure("a{{SUN").unwrap_err();
        match err {
            FontError::Escape(EscapeError::Unclosed { name }) => assert_eq!(name, "SUN"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn three_open_braces_draw_one_brace() {
        let mut engine = engine();
        let mut canvas = Recorder::default();
        let bounds = engine
            .draw(&mut canvas, "{{{", 0, 0, Align::Left, false)
            .unwrap();
        assert_eq!(canvas.blits, vec![(0, 2)]);
        assert_eq!(bounds.width(), 2);
    }

    #[test]
    fn alignment_moves_start() {
        let mut engine = engine();
        let (width, height) = engine.measure("HELLO").unwrap();
        assert_eq!((width, height), (25, 12));

        let mut canvas = Recorder::default();
        let right = engine
            .draw(&mut canvas, "HELLO", 100, 0, Align::Right, false)
            .unwrap();
        assert_eq!(right.x0, 100 - width);
        assert_eq!(canvas.blits[0].0, 75);

        let mut canvas = Recorder::default();
        let center = engine
            .draw(&mut canvas, "HELLO", 100, 0, Align::Center, false)
            .unwrap();
        assert_eq!(center.x0, 100 - width / 2);
        assert_eq!(canvas.blits[0].0, 88);
    }

    #[test]
    fn preload_all_drops_packed_table() {
        let mut engine = FontEngine::new(test_table(), Preload::All, 1, 0);
        assert_eq!(engine.cached_glyphs(), test_table().len());
        assert!(engine.glyphs.is_empty());
        assert_eq!(engine.measure("ab{{SUN}}").unwrap().0, 17);
        assert_eq!(engine.measure("~").unwrap().0, 7);
    }

    #[test]
    fn preload_named_glyphs_only() {
        let engine = FontEngine::new(
            test_table(),
            Preload::Glyphs(vec!["SUN".into(), "a".into()]),
            1,
            0,
        );
        assert_eq!(engine.cached_glyphs(), 2);
        assert!(!engine.glyphs.is_empty());
    }

    #[test]
    fn table_loads_from_json() {
        let table = FontTable::from_json(
            r#"{"UNKNOWN": {"width": 2, "height": 2, "bitmap": [240]},
                "a": {"width": 3, "height": 5, "bitmap": [255, 255]}}"#,
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.line_height(), 5);
        assert_eq!(table.get("a").map(|g| g.width), Some(3));
    }

    #[test]
    fn draws_onto_embedded_graphics_target() {
        use embedded_graphics::mock_display::MockDisplay;

        let mut glyphs = HashMap::new();
        glyphs.insert(UNKNOWN_GLYPH.to_string(), solid(2, 2));
        // diagonal: bits 1 0 / 0 1
        glyphs.insert(
            "a".to_string(),
            Glyph {
                width: 2,
                height: 2,
                bitmap: vec![0b1001_0000],
            },
        );
        let mut engine = FontEngine::new(FontTable::new(glyphs).unwrap(), Preload::None, 1, 0);

        let mut opaque: MockDisplay<BinaryColor> = MockDisplay::new();
        engine
            .draw(&mut opaque, "a", 1, 1, Align::Left, false)
            .unwrap();
        opaque.assert_pattern(&["   ", " #.", " .#"]);

        let mut transparent: MockDisplay<BinaryColor> = MockDisplay::new();
        engine
            .draw(&mut transparent, "a", 1, 1, Align::Left, true)
            .unwrap();
        transparent.assert_pattern(&["   ", " # ", "  #"]);
    }
}
