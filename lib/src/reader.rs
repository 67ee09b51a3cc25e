//! Whitespace separated token input shared by the cluster, job and waiting area readers.
use crate::job::Job;
use std::collections::VecDeque;
use std::io::{self, BufRead};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("unexpected end of input while reading {expected}")]
    UnexpectedEof { expected: &'static str },
    #[error("cannot read {token:?} as {expected}")]
    Parse {
        token: String,
        expected: &'static str,
    },
    #[error("failed to read input: {0}")]
    Io(#[from] io::Error),
}

pub struct TokenReader<R: BufRead> {
    input: R,
    pending: VecDeque<String>,
}

impl<R: BufRead> TokenReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            pending: VecDeque::new(),
        }
    }

    /// Next token, or `None` once the input is exhausted.
    pub fn next_token(&mut self) -> Result<Option<String>, ReadError> {
        while self.pending.is_empty() {
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.pending
                .extend(line.split_whitespace().map(str::to_string));
        }
        Ok(self.pending.pop_front())
    }

    pub fn expect_token(&mut self, expected: &'static str) -> Result<String, ReadError> {
        self.next_token()?
            .ok_or(ReadError::UnexpectedEof { expected })
    }

    pub fn read<T: FromStr>(&mut self, expected: &'static str) -> Result<T, ReadError> {
        let token = self.expect_token(expected)?;
        token
            .parse()
            .map_err(|_| ReadError::Parse { token, expected })
    }

    /// `<id> <size> <remaining_time>`
    pub fn read_job(&mut self) -> Result<Job, ReadError> {
        let id = self.read("job id")?;
        let size: usize = self.read("job size")?;
        let remaining_time: i32 = self.read("job time")?;
        if size == 0 {
            return Err(ReadError::Parse {
                token: size.to_string(),
                expected: "positive job size",
            });
        }
        if remaining_time < 0 {
            return Err(ReadError::Parse {
                token: remaining_time.to_string(),
                expected: "non-negative job time",
            });
        }
        Ok(Job::new(id, size, remaining_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_reader_across_lines() {
        let mut reader = TokenReader::new("a  b\n\n  c\n".as_bytes());
        assert_eq!(reader.next_token().unwrap(), Some("a".to_string()));
        assert_eq!(reader.next_token().unwrap(), Some("b".to_string()));
        assert_eq!(reader.next_token().unwrap(), Some("c".to_string()));
        assert_eq!(reader.next_token().unwrap(), None);
    }

    #[test]
    fn test_token_reader_read_job() {
        let mut reader = TokenReader::new("12 40 7".as_bytes());
        let job = reader.read_job().unwrap();
        assert_eq!((job.id(), job.size(), job.remaining_time()), (12, 40, 7));
    }

    #[test]
    fn test_token_reader_parse_error() {
        let mut reader = TokenReader::new("12 forty 7".as_bytes());
        match reader.read_job() {
            Err(ReadError::Parse { token, expected }) => {
                assert_eq!(token, "forty");
                assert_eq!(expected, "job size");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_token_reader_zero_size_job() {
        let mut reader = TokenReader::new("1 0 5".as_bytes());
        assert!(matches!(reader.read_job(), Err(ReadError::Parse { .. })));
    }

    #[test]
    fn test_token_reader_negative_time_job() {
        let mut reader = TokenReader::new("1 10 -5".as_bytes());
        match reader.read_job() {
            Err(ReadError::Parse { token, expected }) => {
                assert_eq!(token, "-5");
                assert_eq!(expected, "non-negative job time");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_token_reader_zero_time_job() {
        let mut reader = TokenReader::new("1 10 0".as_bytes());
        assert_eq!(reader.read_job().unwrap().remaining_time(), 0);
    }

    #[test]
    fn test_token_reader_unexpected_eof() {
        let mut reader = TokenReader::new("1 10".as_bytes());
        assert!(matches!(
            reader.read_job(),
            Err(ReadError::UnexpectedEof { expected: "job time" })
        ));
    }
}
