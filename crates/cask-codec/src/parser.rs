use std::io::Read;

use tracing::trace;

use cask_core::{ArchiveError, Result};

use crate::frame::{read_frame, Frame};

/// Capability interface driven by the block parser.
///
/// Any error returned from a callback aborts parsing with that error.
pub trait BlockConsumer {
    /// One block header payload.
    fn header(&mut self, payload: &[u8]) -> Result<()>;
    /// One body record payload within the current block.
    fn body(&mut self, payload: &[u8]) -> Result<()>;
    /// Clean end of the archive stream.
    fn end(&mut self) -> Result<()>;
}

/// Drives a consumer through the Header→Body*→Terminator grammar.
pub struct BlockParser<R> {
    source: R,
    ended: bool,
    blocks_read: u64,
}

impl<R: Read> BlockParser<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            ended: false,
            blocks_read: 0,
        }
    }

    /// Parses one block, or notifies `end` on clean stream end.
    ///
    /// Returns `true` when a block was consumed and `false` on stream end.
    /// Calling again after stream end is a "double end" error.
    pub fn read_block(&mut self, consumer: &mut dyn BlockConsumer) -> Result<bool> {
        if self.ended {
            return Err(ArchiveError::Corrupt(
                "read past the end of the archive stream (double end)".into(),
            ));
        }

        let header = match read_frame(&mut self.source)? {
            None => {
                self.ended = true;
                consumer.end()?;
                return Ok(false);
            }
            Some(Frame::Terminator) => {
                return Err(ArchiveError::Corrupt("headerless block".into())
                    .in_block(self.blocks_read));
            }
            Some(Frame::Record(payload)) => payload,
        };
        consumer.header(&header)?;

        let mut bodies = 0_u64;
        loop {
            match read_frame(&mut self.source)? {
                None => {
                    // Stream end between a header and its terminator.
                    return Err(ArchiveError::Truncated("block missing terminator"));
                }
                Some(Frame::Terminator) => {
                    trace!(block = self.blocks_read, bodies, "block parsed");
                    self.blocks_read += 1;
                    return Ok(true);
                }
                Some(Frame::Record(payload)) => {
                    consumer.body(&payload)?;
                    bodies += 1;
                }
            }
        }
    }

    /// Parses blocks until clean stream end.
    pub fn read_all_blocks(&mut self, consumer: &mut dyn BlockConsumer) -> Result<()> {
        while self.read_block(consumer)? {}
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{BlockConsumer, BlockParser};
    use crate::frame::{write_record, write_terminator};
    use cask_core::{ArchiveError, Result};

    #[derive(Default)]
    struct Recording {
        headers: Vec<Vec<u8>>,
        bodies: Vec<Vec<u8>>,
        ends: usize,
    }

    impl BlockConsumer for Recording {
        fn header(&mut self, payload: &[u8]) -> Result<()> {
            self.headers.push(payload.to_vec());
            Ok(())
        }

        fn body(&mut self, payload: &[u8]) -> Result<()> {
            self.bodies.push(payload.to_vec());
            Ok(())
        }

        fn end(&mut self) -> Result<()> {
            self.ends += 1;
            Ok(())
        }
    }

    fn one_block(bodies: &[&[u8]]) -> Vec<u8> {
        let mut wire = Vec::new();
        write_record(&mut wire, b"header").expect("header should write");
        for body in bodies {
            write_record(&mut wire, body).expect("body should write");
        }
        write_terminator(&mut wire).expect("terminator should write");
        wire
    }

    #[test]
    fn header_one_body_terminator_parses() {
        let wire = one_block(&[b"X"]);
        let mut consumer = Recording::default();
        let mut parser = BlockParser::new(Cursor::new(wire));

        assert!(parser.read_block(&mut consumer).expect("block should parse"));
        assert_eq!(consumer.headers, vec![b"header".to_vec()]);
        assert_eq!(consumer.bodies, vec![b"X".to_vec()]);
        assert_eq!(consumer.ends, 0);
    }

    #[test]
    fn stream_end_after_a_block_triggers_end_once() {
        let wire = one_block(&[b"X"]);
        let mut consumer = Recording::default();
        let mut parser = BlockParser::new(Cursor::new(wire));

        assert!(parser.read_block(&mut consumer).expect("block should parse"));
        assert!(!parser.read_block(&mut consumer).expect("clean stream end"));
        assert_eq!(consumer.ends, 1);
    }

    #[test]
    fn empty_input_ends_immediately() {
        let mut consumer = Recording::default();
        let mut parser = BlockParser::new(Cursor::new(Vec::new()));

        assert!(!parser.read_block(&mut consumer).expect("clean stream end"));
        assert_eq!(consumer.ends, 1);
        assert!(consumer.headers.is_empty());
    }

    #[test]
    fn reading_past_stream_end_is_a_double_end_error() {
        let mut consumer = Recording::default();
        let mut parser = BlockParser::new(Cursor::new(Vec::new()));

        assert!(!parser.read_block(&mut consumer).expect("clean stream end"));
        let err = parser.read_block(&mut consumer).expect_err("should fail");
        assert!(err.to_string().contains("double end"));
        assert_eq!(consumer.ends, 1);
    }

    #[test]
    fn bare_terminator_is_a_headerless_block() {
        let mut wire = Vec::new();
        write_terminator(&mut wire).expect("terminator should write");

        let mut consumer = Recording::default();
        let mut parser = BlockParser::new(Cursor::new(wire));
        let err = parser.read_block(&mut consumer).expect_err("should fail");
        assert!(err.to_string().contains("headerless block"));
    }

    #[test]
    fn corrupt_length_in_place_of_terminator_fails() {
        let mut wire = Vec::new();
        write_record(&mut wire, b"header").expect("header should write");
        write_record(&mut wire, b"X").expect("body should write");
        wire.extend_from_slice(&[0xfe, 0xff, 0xff, 0xff]);

        let mut consumer = Recording::default();
        let mut parser = BlockParser::new(Cursor::new(wire));
        let err = parser.read_block(&mut consumer).expect_err("should fail");
        assert!(matches!(err, ArchiveError::Corrupt(_)));
        // Callbacks already delivered stay delivered.
        assert_eq!(consumer.headers.len(), 1);
        assert_eq!(consumer.bodies.len(), 1);
    }

    #[test]
    fn truncation_before_terminator_keeps_delivered_callbacks() {
        let mut wire = Vec::new();
        write_record(&mut wire, b"header").expect("header should write");
        write_record(&mut wire, b"body").expect("body should write");
        // No terminator: stream just stops.

        let mut consumer = Recording::default();
        let mut parser = BlockParser::new(Cursor::new(wire));
        let err = parser.read_block(&mut consumer).expect_err("should fail");
        assert!(matches!(err, ArchiveError::Truncated(_)));
        assert_eq!(consumer.headers, vec![b"header".to_vec()]);
        assert_eq!(consumer.bodies, vec![b"body".to_vec()]);
        assert_eq!(consumer.ends, 0);
    }

    #[test]
    fn consumer_errors_abort_parsing() {
        struct FailingBody;

        impl BlockConsumer for FailingBody {
            fn header(&mut self, _: &[u8]) -> Result<()> {
                Ok(())
            }
            fn body(&mut self, _: &[u8]) -> Result<()> {
                Err(ArchiveError::Protocol("body rejected".into()))
            }
            fn end(&mut self) -> Result<()> {
                Ok(())
            }
        }

        let wire = one_block(&[b"X"]);
        let mut parser = BlockParser::new(Cursor::new(wire));
        let err = parser
            .read_block(&mut FailingBody)
            .expect_err("consumer error should propagate");
        assert!(err.to_string().contains("body rejected"));
    }

    #[test]
    fn read_all_blocks_walks_every_block() {
        let mut wire = one_block(&[b"a", b"b"]);
        wire.extend(one_block(&[]));
        wire.extend(one_block(&[b"c"]));

        let mut consumer = Recording::default();
        let mut parser = BlockParser::new(Cursor::new(wire));
        parser
            .read_all_blocks(&mut consumer)
            .expect("all blocks should parse");
        assert_eq!(consumer.headers.len(), 3);
        assert_eq!(consumer.bodies.len(), 3);
        assert_eq!(consumer.ends, 1);
    }
}
