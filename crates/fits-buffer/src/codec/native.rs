//! The default codec: `fitsio-pure` behind the [`ImageCodec`] seam.
//!
//! Reading opens the file with [`FitsFile::open`] and decodes the primary HDU
//! through the library's image routines, with BSCALE/BZERO applied. Writing
//! creates the file with [`FitsFile::create`], buffers a `BITPIX = -32`
//! primary image and hands the finished HDU back to the file on
//! [`ImageCodec::close`].

use std::path::Path;

use fitsio_pure::compat::fitsfile::FitsFile;
use fitsio_pure::hdu::{parse_fits, Hdu, HduInfo};
use fitsio_pure::header::{header_byte_len, parse_header_blocks, Card};
use fitsio_pure::image::{
    apply_bscale_bzero, blank_mask, build_image_hdu, bytes_per_pixel, extract_blank,
    extract_bscale_bzero, read_image_section, ImageData,
};
use fitsio_pure::value::Value;

use super::{Error, FitsError, ImageCodec, Result};

const MAX_NAXIS: usize = 999;
const FLOAT_BITPIX: i64 = -32;

/// The default [`ImageCodec`]: plain FITS files through `fitsio-pure`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeCodec;

/// An open FITS file, either being read or being written.
pub struct FitsHandle {
    file: FitsFile,
    mode: Mode,
}

impl std::fmt::Debug for FitsHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitsHandle")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum Mode {
    Read {
        hdu: Hdu,
    },
    Write {
        naxes: Option<Vec<usize>>,
        pixels: Vec<f32>,
    },
}

fn integer_key(cards: &[Card], name: &str) -> Option<i64> {
    cards.iter().find_map(|card| match &card.value {
        Some(Value::Integer(n)) if card.keyword_str() == name => Some(*n),
        _ => None,
    })
}

/// Parse the primary HDU after checking its declared data size against the
/// bytes actually present. Later HDUs are never walked.
fn primary_hdu(data: &[u8]) -> Result<Hdu> {
    let header_len = header_byte_len(data)?;
    let cards = parse_header_blocks(&data[..header_len])?;

    let bitpix = integer_key(&cards, "BITPIX").ok_or(Error::MissingKeyword("BITPIX"))?;
    let bpp = bytes_per_pixel(bitpix)?;
    let naxis = integer_key(&cards, "NAXIS").ok_or(Error::MissingKeyword("NAXIS"))?;
    if !(0..=MAX_NAXIS as i64).contains(&naxis) {
        return Err(Error::InvalidNaxis(naxis));
    }

    let mut pixels: usize = if naxis == 0 { 0 } else { 1 };
    for i in 1..=naxis as usize {
        let n = integer_key(&cards, &format!("NAXIS{i}"))
            .ok_or(Error::MissingKeyword("NAXISn"))?;
        let n = usize::try_from(n).map_err(|_| Error::InvalidNaxes(n))?;
        pixels = pixels.checked_mul(n).ok_or(Error::invalid_naxes(n))?;
    }
    let data_len = pixels
        .checked_mul(bpp)
        .ok_or(Error::invalid_naxes(pixels))?;
    let end = header_len
        .checked_add(data_len)
        .filter(|&end| end <= data.len())
        .ok_or(Error::UnexpectedEof)?;

    let hdu = parse_fits(&data[..end])?
        .hdus
        .into_iter()
        .next()
        .ok_or(Error::NoImage)?;
    match hdu.info {
        HduInfo::Primary { .. } => Ok(hdu),
        _ => Err(Error::NoImage),
    }
}

fn pixel_count(hdu: &Hdu) -> usize {
    match &hdu.info {
        HduInfo::Primary { naxes, .. } if !naxes.is_empty() => naxes.iter().product(),
        _ => 0,
    }
}

fn check_range(first_pixel: usize, count: usize, total: usize) -> Result<usize> {
    let range_error = Error::PixelRange {
        first: first_pixel,
        count,
        total,
    };
    if first_pixel == 0 {
        return Err(range_error);
    }
    let offset = first_pixel - 1;
    match offset.checked_add(count) {
        Some(end) if end <= total => Ok(offset),
        _ => Err(range_error),
    }
}

/// Convert decoded samples to physical `f32` values in `out`, substituting
/// `null_value` for undefined pixels unless it is zero.
fn calibrate(
    raw: &ImageData,
    (bscale, bzero): (f64, f64),
    blank: Option<i64>,
    null_value: f32,
    out: &mut [f32],
) -> bool {
    match raw {
        // Unscaled single-precision data is copied bit-for-bit.
        ImageData::F32(samples) if bscale == 1.0 && bzero == 0.0 => {
            for (dst, &v) in out.iter_mut().zip(samples) {
                *dst = v;
            }
        }
        _ => {
            for (dst, v) in out.iter_mut().zip(apply_bscale_bzero(raw, bscale, bzero)) {
                *dst = v as f32;
            }
        }
    }

    if null_value == 0.0 {
        return false;
    }
    let Some(mask) = blank_mask(raw, blank) else {
        return false;
    };
    for (dst, _) in out.iter_mut().zip(mask).filter(|(_, is_null)| *is_null) {
        *dst = null_value;
    }
    true
}

impl ImageCodec for NativeCodec {
    type Handle = FitsHandle;

    fn open(&self, path: &Path) -> Result<FitsHandle> {
        let file = FitsFile::open(path).map_err(Error::Open)?;
        let hdu = primary_hdu(file.data())?;
        Ok(FitsHandle {
            file,
            mode: Mode::Read { hdu },
        })
    }

    fn read_dimension_keys(&self, handle: &FitsHandle, count: usize) -> Result<Vec<usize>> {
        let Mode::Read { hdu } = &handle.mode else {
            return Err(Error::NoImage);
        };
        let mut naxes = Vec::with_capacity(count);
        for i in 1..=count {
            let Some(n) = integer_key(&hdu.cards, &format!("NAXIS{i}")) else {
                break;
            };
            naxes.push(usize::try_from(n).map_err(|_| Error::InvalidNaxes(n))?);
        }
        if naxes.is_empty() && count > 0 {
            return Err(Error::MissingKeyword("NAXIS1"));
        }
        Ok(naxes)
    }

    fn read_pixels_as_float(
        &self,
        handle: &FitsHandle,
        first_pixel: usize,
        null_value: f32,
        out: &mut [f32],
    ) -> Result<bool> {
        let Mode::Read { hdu } = &handle.mode else {
            return Err(Error::NoImage);
        };

        let offset = check_range(first_pixel, out.len(), pixel_count(hdu))?;
        let raw = read_image_section(handle.file.data(), hdu, offset, out.len())?;
        Ok(calibrate(
            &raw,
            extract_bscale_bzero(&hdu.cards),
            extract_blank(&hdu.cards),
            null_value,
            out,
        ))
    }

    fn close(&self, handle: FitsHandle) -> Result<()> {
        let FitsHandle { mut file, mode } = handle;
        let Mode::Write { naxes, pixels } = mode else {
            return Ok(());
        };

        // An image that was never defined is written as an empty primary HDU.
        let hdu = match naxes {
            Some(naxes) => build_image_hdu(FLOAT_BITPIX, &naxes, &ImageData::F32(pixels)),
            None => build_image_hdu(8, &[], &ImageData::U8(Vec::new())),
        }
        .map_err(|e| Error::Write(FitsError::from(e)))?;

        file.set_data(hdu);
        file.flush().map_err(Error::Write)
    }

    fn create(&self, path: &Path) -> Result<FitsHandle> {
        if path.exists() {
            return Err(Error::AlreadyExists(path.to_path_buf()));
        }
        let file = FitsFile::create(path).open().map_err(Error::Create)?;
        Ok(FitsHandle {
            file,
            mode: Mode::Write {
                naxes: None,
                pixels: Vec::new(),
            },
        })
    }

    fn create_image(&self, handle: &mut FitsHandle, naxes: &[usize]) -> Result<()> {
        let Mode::Write {
            naxes: defined,
            pixels,
        } = &mut handle.mode
        else {
            return Err(Error::ReadOnly);
        };
        if defined.is_some() {
            return Err(Error::ImageExists);
        }
        if naxes.len() > MAX_NAXIS {
            return Err(Error::InvalidNaxis(naxes.len() as i64));
        }

        let count = if naxes.is_empty() {
            0
        } else {
            naxes
                .iter()
                .try_fold(1usize, |acc, &n| acc.checked_mul(n))
                .filter(|n| n.checked_mul(std::mem::size_of::<f32>()).is_some())
                .ok_or(Error::invalid_naxes(usize::MAX))?
        };

        *pixels = vec![0.0; count];
        *defined = Some(naxes.to_vec());
        Ok(())
    }

    fn write_pixels_as_float(
        &self,
        handle: &mut FitsHandle,
        first_pixel: usize,
        values: &[f32],
    ) -> Result<()> {
        let Mode::Write { naxes, pixels } = &mut handle.mode else {
            return Err(Error::ReadOnly);
        };
        if naxes.is_none() {
            return Err(Error::NoImage);
        }

        let offset = check_range(first_pixel, values.len(), pixels.len())?;
        pixels[offset..offset + values.len()].copy_from_slice(values);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::fits_bytes;
    use super::*;
    use crate::codec::status;
    use fitsio_pure::BLOCK_SIZE;

    fn write_float_image(path: &Path, naxes: &[usize], pixels: &[f32]) {
        let codec = NativeCodec;
        let mut h = codec.create(path).unwrap();
        codec.create_image(&mut h, naxes).unwrap();
        codec.write_pixels_as_float(&mut h, 1, pixels).unwrap();
        codec.close(h).unwrap();
    }

    #[test]
    fn write_then_read_float_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.fits");
        let pixels: Vec<f32> = (0..12).map(|i| i as f32 * 0.5 - 2.0).collect();
        write_float_image(&path, &[4, 3], &pixels);

        let len = std::fs::metadata(&path).unwrap().len() as usize;
        assert_eq!(len % BLOCK_SIZE, 0);

        let codec = NativeCodec;
        let h = codec.open(&path).unwrap();
        assert_eq!(codec.read_dimension_keys(&h, 2).unwrap(), vec![4, 3]);
        let mut out = vec![0.0f32; 12];
        let any_null = codec.read_pixels_as_float(&h, 1, 0.0, &mut out).unwrap();
        assert!(!any_null);
        assert_eq!(out, pixels);
        codec.close(h).unwrap();
    }

    #[test]
    fn read_partial_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part.fits");
        write_float_image(&path, &[5], &[1.0, 2.0, 3.0, 4.0, 5.0]);

        let codec = NativeCodec;
        let h = codec.open(&path).unwrap();
        let mut out = [0.0f32; 2];
        codec.read_pixels_as_float(&h, 3, 0.0, &mut out).unwrap();
        assert_eq!(out, [3.0, 4.0]);

        let mut too_many = [0.0f32; 3];
        let err = codec
            .read_pixels_as_float(&h, 4, 0.0, &mut too_many)
            .unwrap_err();
        assert!(matches!(err, Error::PixelRange { first: 4, count: 3, total: 5 }));

        let err = codec.read_pixels_as_float(&h, 0, 0.0, &mut out).unwrap_err();
        assert_eq!(err.status(), status::BAD_PIX_NUM);
    }

    #[test]
    fn read_scaled_i16_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("u16.fits");
        let raw: Vec<u8> = [-32768i16, 0, 32767]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        let cards = [
            ("SIMPLE", "T"),
            ("BITPIX", "16"),
            ("NAXIS", "1"),
            ("NAXIS1", "3"),
            ("BZERO", "32768.0"),
        ];
        std::fs::write(&path, fits_bytes(&cards, &raw)).unwrap();

        let h = NativeCodec.open(&path).unwrap();
        let mut out = [0.0f32; 3];
        NativeCodec.read_pixels_as_float(&h, 1, 0.0, &mut out).unwrap();
        assert_eq!(out, [0.0, 32768.0, 65535.0]);
    }

    #[test]
    fn blank_pixels_only_substituted_with_nonzero_null_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.fits");
        let raw: Vec<u8> = [7i32, -999, 9]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        let cards = [
            ("SIMPLE", "T"),
            ("BITPIX", "32"),
            ("NAXIS", "1"),
            ("NAXIS1", "3"),
            ("BLANK", "-999"),
        ];
        std::fs::write(&path, fits_bytes(&cards, &raw)).unwrap();

        let h = NativeCodec.open(&path).unwrap();
        let mut out = [0.0f32; 3];
        assert!(!NativeCodec.read_pixels_as_float(&h, 1, 0.0, &mut out).unwrap());
        assert_eq!(out, [7.0, -999.0, 9.0]);

        assert!(NativeCodec.read_pixels_as_float(&h, 1, -1.0, &mut out).unwrap());
        assert_eq!(out, [7.0, -1.0, 9.0]);
    }

    #[test]
    fn nan_passes_through_without_null_checking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nan.fits");
        write_float_image(&path, &[2], &[f32::NAN, 1.0]);

        let h = NativeCodec.open(&path).unwrap();
        let mut out = [0.0f32; 2];
        assert!(!NativeCodec.read_pixels_as_float(&h, 1, 0.0, &mut out).unwrap());
        assert!(out[0].is_nan());
        assert!(NativeCodec.read_pixels_as_float(&h, 1, 5.0, &mut out).unwrap());
        assert_eq!(out, [5.0, 1.0]);
    }

    #[test]
    fn create_refuses_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exists.fits");
        std::fs::write(&path, b"").unwrap();

        let err = NativeCodec.create(&path).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert_eq!(err.status(), status::FILE_NOT_CREATED);
        assert_eq!(std::fs::read(&path).unwrap(), b"");
    }

    #[test]
    fn open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = NativeCodec.open(&dir.path().join("missing.fits")).unwrap_err();
        assert!(matches!(err, Error::Open(_)));
        assert_eq!(err.status(), status::FILE_NOT_OPENED);
    }

    #[test]
    fn open_rejects_non_fits_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.fits");

        std::fs::write(&path, vec![b' '; BLOCK_SIZE]).unwrap();
        assert!(matches!(NativeCodec.open(&path), Err(Error::UnexpectedEof)));

        let cards = [("BITPIX", "8"), ("NAXIS", "0")];
        std::fs::write(&path, fits_bytes(&cards, &[])).unwrap();
        assert!(NativeCodec.open(&path).is_err());

        let cards = [("SIMPLE", "T"), ("BITPIX", "12"), ("NAXIS", "0")];
        std::fs::write(&path, fits_bytes(&cards, &[])).unwrap();
        assert!(matches!(NativeCodec.open(&path), Err(Error::InvalidBitpix(12))));
    }

    #[test]
    fn open_rejects_truncated_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.fits");
        let cards = [
            ("SIMPLE", "T"),
            ("BITPIX", "-32"),
            ("NAXIS", "2"),
            ("NAXIS1", "100"),
            ("NAXIS2", "100"),
        ];
        std::fs::write(&path, fits_bytes(&cards, &[])).unwrap();
        assert!(matches!(NativeCodec.open(&path), Err(Error::UnexpectedEof)));
    }

    #[test]
    fn open_rejects_oversized_axes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.fits");

        let cards = [
            ("SIMPLE", "T"),
            ("BITPIX", "-32"),
            ("NAXIS", "2"),
            ("NAXIS1", "4294967296"),
            ("NAXIS2", "4294967296"),
        ];
        std::fs::write(&path, fits_bytes(&cards, &[])).unwrap();
        let err = NativeCodec.open(&path).unwrap_err();
        assert_eq!(err.status(), status::BAD_NAXES);

        let cards = [
            ("SIMPLE", "T"),
            ("BITPIX", "64"),
            ("NAXIS", "1"),
            ("NAXIS1", "2305843009213693951"),
        ];
        std::fs::write(&path, fits_bytes(&cards, &[])).unwrap();
        assert!(matches!(NativeCodec.open(&path), Err(Error::UnexpectedEof)));

        let cards = [("SIMPLE", "T"), ("BITPIX", "8"), ("NAXIS", "1"), ("NAXIS1", "-4")];
        std::fs::write(&path, fits_bytes(&cards, &[])).unwrap();
        assert!(matches!(NativeCodec.open(&path), Err(Error::InvalidNaxes(-4))));

        let cards = [("SIMPLE", "T"), ("BITPIX", "8"), ("NAXIS", "1000")];
        std::fs::write(&path, fits_bytes(&cards, &[])).unwrap();
        assert!(matches!(NativeCodec.open(&path), Err(Error::InvalidNaxis(1000))));
    }

    #[test]
    fn dimension_keys_stop_at_naxis() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dims.fits");
        let cards = [("SIMPLE", "T"), ("BITPIX", "8"), ("NAXIS", "1"), ("NAXIS1", "6")];
        std::fs::write(&path, fits_bytes(&cards, &[0u8; 6])).unwrap();

        let h = NativeCodec.open(&path).unwrap();
        assert_eq!(NativeCodec.read_dimension_keys(&h, 2).unwrap(), vec![6]);

        let cards = [("SIMPLE", "T"), ("BITPIX", "8"), ("NAXIS", "0")];
        std::fs::write(&path, fits_bytes(&cards, &[])).unwrap();
        let h = NativeCodec.open(&path).unwrap();
        assert!(matches!(
            NativeCodec.read_dimension_keys(&h, 2),
            Err(Error::MissingKeyword("NAXIS1"))
        ));
    }

    #[test]
    fn write_mode_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.fits");
        let codec = NativeCodec;

        let mut h = codec.create(&path).unwrap();
        assert!(matches!(
            codec.write_pixels_as_float(&mut h, 1, &[1.0]),
            Err(Error::NoImage)
        ));
        codec.create_image(&mut h, &[2]).unwrap();
        assert!(matches!(codec.create_image(&mut h, &[2]), Err(Error::ImageExists)));
        assert!(matches!(
            codec.write_pixels_as_float(&mut h, 2, &[1.0, 2.0]),
            Err(Error::PixelRange { .. })
        ));
        codec.close(h).unwrap();

        let mut h = codec.open(&path).unwrap();
        assert!(matches!(codec.create_image(&mut h, &[2]), Err(Error::ReadOnly)));
        assert!(matches!(
            codec.write_pixels_as_float(&mut h, 1, &[1.0]),
            Err(Error::ReadOnly)
        ));
    }

    #[test]
    fn create_image_rejects_overflowing_shape() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = NativeCodec.create(&dir.path().join("big.fits")).unwrap();
        let err = NativeCodec
            .create_image(&mut h, &[usize::MAX, 2])
            .unwrap_err();
        assert_eq!(err.status(), status::BAD_NAXES);
    }

    #[test]
    fn zero_axis_image_is_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.fits");
        let codec = NativeCodec;

        let mut h = codec.create(&path).unwrap();
        codec.create_image(&mut h, &[]).unwrap();
        codec.close(h).unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, BLOCK_SIZE);
        let h = codec.open(&path).unwrap();
        assert!(codec.read_dimension_keys(&h, 2).is_err());
    }
}
