use std::io;

use crate::process::{ChannelCoding, Predictor, sign_extend_raw};
use crate::structs::attributes::Attributes;
use crate::utils::bitstream_io::BitstreamIoReader;
use crate::utils::errors::{DecodeError, OndaError, Result};

/// Decodes blocks written by [`BlockEncoder`](crate::process::encode::BlockEncoder).
#[derive(Debug, Clone)]
pub struct BlockDecoder {
    num_channels: usize,
    sample_length: u32,
    key_length: u32,
    codings: Vec<ChannelCoding>,
    predictors: Vec<Predictor>,
}

impl BlockDecoder {
    pub fn new(num_channels: usize, sample_length: u32, key_length: u32) -> Self {
        Self {
            num_channels,
            sample_length,
            key_length,
            codings: vec![ChannelCoding::new(sample_length); num_channels],
            predictors: vec![Predictor::default(); num_channels],
        }
    }

    pub fn with_attributes(attributes: &Attributes) -> Self {
        Self::new(
            attributes.num_channels as usize,
            attributes.bits_per_sample as u32,
            attributes.key_length as u32,
        )
    }

    /// Encoding lengths read from the keys of the most recent block.
    pub fn encoding_lengths(&self) -> impl Iterator<Item = u32> + '_ {
        self.codings.iter().map(|c| c.encoding_length)
    }

    /// Decodes `frames` sample frames, appending the samples to `out`.
    pub fn read_block<R: io::Read>(
        &mut self,
        bits: &mut BitstreamIoReader<R>,
        frames: usize,
        out: &mut Vec<i32>,
    ) -> Result<()> {
        if frames == 0 {
            return Ok(());
        }

        let sl = self.sample_length;

        for (channel, coding) in self.codings.iter_mut().enumerate() {
            let key: u32 = bits.get_n(self.key_length).map_err(end_of_data)?;
            if key >= sl {
                return Err(DecodeError::InvalidEncodingKey { channel, key }.into());
            }
            *coding = ChannelCoding::new(sl - key);
        }

        self.predictors.fill(Predictor::default());
        out.reserve(frames * self.num_channels);

        for frame in 0..frames {
            for (channel, (coding, predictor)) in
                self.codings.iter().zip(&mut self.predictors).enumerate()
            {
                let sample = if (frame == 0 && channel == 0) || coding.encoding_length == sl {
                    read_raw(bits, sl)?
                } else {
                    let code: u32 = bits.get_n(coding.encoding_length).map_err(end_of_data)?;
                    if code == coding.excess_code {
                        read_raw(bits, sl)?
                    } else {
                        predictor.prev_sample + predictor.prev_delta + coding.sign_extend(code)
                    }
                };

                predictor.update(sample);
                out.push(sample as i32);
            }
        }

        Ok(())
    }
}

#[inline(always)]
fn read_raw<R: io::Read>(bits: &mut BitstreamIoReader<R>, sample_length: u32) -> Result<i64> {
    let raw: u32 = bits.get_n(sample_length).map_err(end_of_data)?;
    Ok(sign_extend_raw(raw, sample_length) as i64)
}

fn end_of_data(e: io::Error) -> OndaError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        DecodeError::EndOfData.into()
    } else {
        e.into()
    }
}
