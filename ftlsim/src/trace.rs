//! Binary request traces

// Imports
use {
	crate::request::{Op, Request},
	anyhow::Context,
	byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt},
	ftlsim_util::ReadByteArray,
	std::io,
};

/// Trace reader.
///
/// Yields each record as a [`Request`], reading lazily from the underlying reader.
#[derive(Clone, Debug)]
pub struct TraceReader<R> {
	/// Header
	header: Header,

	/// Records remaining
	records_remaining: u64,

	/// Reader
	reader: R,
}

impl<R: io::Read + io::Seek> TraceReader<R> {
	/// Parses a trace from a reader
	pub fn from_reader(mut reader: R) -> Result<Self, anyhow::Error> {
		// Read the magic
		let magic = reader.read_byte_array().context("Unable to read magic")?;
		anyhow::ensure!(magic == MAGIC, "Found wrong magic {magic:?}, expected {MAGIC:?}");

		// Read the header
		let header = Header::from_reader(&mut reader).context("Unable to read header")?;
		anyhow::ensure!(header.page_size != 0, "Trace page size must be non-zero");
		tracing::trace!(?header, "Parsed header");

		// Check that the header agrees with the trace size
		let records_remaining = {
			let start = reader.stream_position().context("Unable to get stream position")?;
			let end = reader.seek(io::SeekFrom::End(0)).context("Unable to seek to end")?;
			reader
				.seek(io::SeekFrom::Start(start))
				.context("Unable to seek back to records")?;

			let actual_records = (end - start) / Record::BYTE_SIZE as u64;
			if actual_records != header.records || (end - start) % Record::BYTE_SIZE as u64 != 0 {
				tracing::warn!(
					"Trace size differs from expected. Found {} bytes of records, expected {}",
					end - start,
					header.records * Record::BYTE_SIZE as u64
				);
			}

			actual_records.min(header.records)
		};

		Ok(Self {
			header,
			records_remaining,
			reader,
		})
	}

	/// Returns the header
	pub fn header(&self) -> &Header {
		&self.header
	}

	/// Returns the remaining records
	pub fn records_remaining(&self) -> u64 {
		self.records_remaining
	}
}

impl<R: io::Read> TraceReader<R> {
	/// Reads the next record
	pub fn read_next(&mut self) -> Result<Option<Record>, anyhow::Error> {
		// If we're done, return `None`
		if self.records_remaining == 0 {
			return Ok(None);
		}

		// Else parse the next record and reduce the remaining records
		let record = Record::from_reader(&mut self.reader).context("Unable to read record")?;
		self.records_remaining -= 1;

		Ok(Some(record))
	}

	/// Reads the next record as a request
	pub fn read_request(&mut self) -> Result<Option<Request>, anyhow::Error> {
		let page_size = self.header.page_size;
		self.read_next()?
			.map(|record| record.to_request(page_size))
			.transpose()
	}
}

impl<R: io::Read> Iterator for TraceReader<R> {
	type Item = Result<Request, anyhow::Error>;

	fn next(&mut self) -> Option<Self::Item> {
		let res = self.read_request().transpose();

		// Note: After an error, the reader's position is unknown
		if matches!(res, Some(Err(_))) {
			self.records_remaining = 0;
		}

		res
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		let remaining = usize::try_from(self.records_remaining).unwrap_or(usize::MAX);
		(0, Some(remaining))
	}
}

/// Trace writer
#[derive(Clone, Debug)]
pub struct TraceWriter<W> {
	/// Page size
	page_size: u64,

	/// Records written
	records_written: u64,

	/// Writer
	writer: W,
}

impl<W: io::Write + io::Seek> TraceWriter<W> {
	/// Creates a new writer
	pub fn new(mut writer: W, page_size: u64) -> Result<Self, anyhow::Error> {
		// Write the magic
		// Note: We rewind to ensure we write at the start, because we then
		//       later come back to write the header
		writer.rewind().context("Unable to rewind to start")?;
		writer.write_all(&MAGIC).context("Unable to write magic")?;

		// Reserve the header
		Header {
			records: 0,
			page_size,
		}
		.to_writer(&mut writer)
		.context("Unable to reserve header")?;

		Ok(Self {
			page_size,
			records_written: 0,
			writer,
		})
	}

	/// Writes a record
	pub fn write(&mut self, record: &Record) -> Result<(), anyhow::Error> {
		record.to_writer(&mut self.writer).context("Unable to write record")?;

		self.records_written += 1;
		Ok(())
	}

	/// Returns the number of records written
	pub fn records_written(&self) -> u64 {
		self.records_written
	}

	/// Finishes writing
	pub fn finish(mut self) -> Result<W, anyhow::Error> {
		// Rewind the writer and write the header
		self.writer
			.seek(io::SeekFrom::Start(MAGIC.len() as u64))
			.context("Unable to seek to header")?;

		let header = Header {
			records:   self.records_written,
			page_size: self.page_size,
		};
		header.to_writer(&mut self.writer).context("Unable to write header")?;

		self.writer.seek(io::SeekFrom::End(0)).context("Unable to seek to end")?;
		self.writer.flush().context("Unable to flush writer")?;

		Ok(self.writer)
	}
}

/// Magic
pub const MAGIC: [u8; 8] = *b"FTLT v0\0";

/// Header
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Header {
	/// Total records
	pub records: u64,

	/// Page size the trace was recorded with, in bytes
	pub page_size: u64,
}

impl Header {
	/// Returns the size of this header (including any padding)
	pub const BYTE_SIZE: usize = 0x18;

	/// Parses a header from a reader
	pub fn from_reader<R: io::Read + io::Seek>(reader: &mut R) -> Result<Self, anyhow::Error> {
		let records = reader.read_u64::<LittleEndian>().context("Unable to read records")?;
		let page_size = reader
			.read_u64::<LittleEndian>()
			.context("Unable to read page size")?;

		// Then seek over the padding
		reader
			.seek(io::SeekFrom::Current(8))
			.context("Unable to seek over padding")?;

		Ok(Self { records, page_size })
	}

	/// Writes a header to a writer
	pub fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<(), anyhow::Error> {
		writer
			.write_u64::<LittleEndian>(self.records)
			.context("Unable to write records")?;
		writer
			.write_u64::<LittleEndian>(self.page_size)
			.context("Unable to write page size")?;
		writer
			.write_u64::<LittleEndian>(0)
			.context("Unable to write padding")?;

		Ok(())
	}
}

/// Record
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Record {
	/// Arrival time, in nanoseconds
	pub time: u64,

	/// Byte offset
	pub offset: u64,

	/// Size, in bytes
	pub size: u64,

	/// Operation
	pub op: Op,
}

impl Record {
	/// Returns the size of this record
	pub const BYTE_SIZE: usize = 0x20;

	/// Parses a record from a reader
	pub fn from_reader<R: io::Read>(reader: &mut R) -> Result<Self, anyhow::Error> {
		let time = reader.read_u64::<LittleEndian>().context("Unable to read time")?;
		let offset = reader.read_u64::<LittleEndian>().context("Unable to read offset")?;
		let size = reader.read_u64::<LittleEndian>().context("Unable to read size")?;
		let op = match reader.read_u64::<LittleEndian>().context("Unable to read op")? {
			0 => Op::Read,
			1 => Op::Write,
			2 => Op::Discard,
			op => anyhow::bail!("Unknown op: {op}"),
		};

		Ok(Self { time, offset, size, op })
	}

	/// Writes a record to a writer
	pub fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<(), anyhow::Error> {
		let op = match self.op {
			Op::Read => 0,
			Op::Write => 1,
			Op::Discard => 2,
		};

		writer
			.write_u64::<LittleEndian>(self.time)
			.context("Unable to write time")?;
		writer
			.write_u64::<LittleEndian>(self.offset)
			.context("Unable to write offset")?;
		writer
			.write_u64::<LittleEndian>(self.size)
			.context("Unable to write size")?;
		writer.write_u64::<LittleEndian>(op).context("Unable to write op")?;

		Ok(())
	}

	/// Converts this record into a request over the pages it touches
	pub fn to_request(&self, page_size: u64) -> Result<Request, anyhow::Error> {
		Request::from_bytes(self.op, self.offset, self.size, page_size, self.time).with_context(|| {
			format!(
				"Record extent {:#x}+{:#x} overflows the address space",
				self.offset, self.size
			)
		})
	}
}
