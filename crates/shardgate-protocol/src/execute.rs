use crate::messages::{ColumnType, ParameterType};
use crate::payload::PayloadReader;
use bytes::Bytes;
use shardgate_core::error::ProxyError;
use shardgate_core::types::{DataValue, ParameterSet};

const UNSIGNED_FLAG: u8 = 0x80;

/// Decodes the parameter section of a `COM_STMT_EXECUTE` body.
///
/// `previous_types` are the types bound by the last execution of the same
/// statement on this connection; they are used when the client does not
/// resend types. Returns the values together with the types in effect.
pub fn decode_execute_parameters(
    body: Bytes,
    num_params: usize,
    previous_types: Option<&[ParameterType]>,
) -> Result<(ParameterSet, Vec<ParameterType>), ProxyError> {
    if num_params == 0 {
        return Ok((Vec::new(), Vec::new()));
    }
    let mut reader = PayloadReader::new(body);
    let null_bitmap = reader.read_bytes((num_params + 7) / 8)?;
    let new_params_bound = reader.read_int1()?;
    let types = if new_params_bound == 1 {
        let mut types = Vec::with_capacity(num_params);
        for _ in 0..num_params {
            let code = reader.read_int1()?;
            let flags = reader.read_int1()?;
            let column_type = ColumnType::from_code(code).ok_or_else(|| {
                ProxyError::Protocol(format!("unknown parameter type 0x{code:02x}"))
            })?;
            types.push(ParameterType {
                column_type,
                unsigned: flags & UNSIGNED_FLAG != 0,
            });
        }
        types
    } else {
        match previous_types {
            Some(types) if types.len() == num_params => types.to_vec(),
            _ => {
                return Err(ProxyError::Protocol(
                    "parameter types were never bound for this statement".into(),
                ))
            }
        }
    };

    let mut values = Vec::with_capacity(num_params);
    for (index, param_type) in types.iter().enumerate() {
        if null_bitmap[index / 8] & (1 << (index % 8)) != 0 {
            values.push(DataValue::Null);
            continue;
        }
        values.push(read_value(&mut reader, *param_type)?);
    }
    Ok((values, types))
}

fn read_value(reader: &mut PayloadReader, param_type: ParameterType) -> Result<DataValue, ProxyError> {
    let unsigned = param_type.unsigned;
    let value = match param_type.column_type {
        ColumnType::Null => DataValue::Null,
        ColumnType::Tiny => {
            let raw = reader.read_int1()?;
            if unsigned {
                DataValue::UInt64(u64::from(raw))
            } else {
                DataValue::Int64(i64::from(raw as i8))
            }
        }
        ColumnType::Short | ColumnType::Year => {
            let raw = reader.read_int2()?;
            if unsigned {
                DataValue::UInt64(u64::from(raw))
            } else {
                DataValue::Int64(i64::from(raw as i16))
            }
        }
        ColumnType::Long | ColumnType::Int24 => {
            let raw = reader.read_int4()?;
            if unsigned {
                DataValue::UInt64(u64::from(raw))
            } else {
                DataValue::Int64(i64::from(raw as i32))
            }
        }
        ColumnType::LongLong => {
            let raw = reader.read_int8()?;
            if unsigned {
                DataValue::UInt64(raw)
            } else {
                DataValue::Int64(raw as i64)
            }
        }
        ColumnType::Float => DataValue::Float64(f64::from(reader.read_f32()?)),
        ColumnType::Double => DataValue::Float64(reader.read_f64()?),
        ColumnType::Date | ColumnType::DateTime | ColumnType::Timestamp => {
            DataValue::String(read_datetime(reader)?)
        }
        ColumnType::Time => DataValue::String(read_time(reader)?),
        _ => {
            let raw = reader.read_bytes_lenenc()?;
            match std::str::from_utf8(&raw) {
                Ok(text) => DataValue::String(text.to_string()),
                Err(_) => DataValue::Bytes(raw.to_vec()),
            }
        }
    };
    Ok(value)
}

fn read_datetime(reader: &mut PayloadReader) -> Result<String, ProxyError> {
    let len = reader.read_int1()?;
    if len == 0 {
        return Ok("0000-00-00 00:00:00".into());
    }
    let year = reader.read_int2()?;
    let month = reader.read_int1()?;
    let day = reader.read_int1()?;
    if len == 4 {
        return Ok(format!("{year:04}-{month:02}-{day:02}"));
    }
    let hour = reader.read_int1()?;
    let minute = reader.read_int1()?;
    let second = reader.read_int1()?;
    let mut text = format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}");
    if len == 11 {
        let micros = reader.read_int4()?;
        text.push_str(&format!(".{micros:06}"));
    } else if len != 7 {
        return Err(ProxyError::Protocol(format!("invalid datetime length {len}")));
    }
    Ok(text)
}

fn read_time(reader: &mut PayloadReader) -> Result<String, ProxyError> {
    let len = reader.read_int1()?;
    if len == 0 {
        return Ok("00:00:00".into());
    }
    if len != 8 && len != 12 {
        return Err(ProxyError::Protocol(format!("invalid time length {len}")));
    }
    let negative = reader.read_int1()? == 1;
    let days = reader.read_int4()?;
    let hour = reader.read_int1()?;
    let minute = reader.read_int1()?;
    let second = reader.read_int1()?;
    let hours = u64::from(days) * 24 + u64::from(hour);
    let sign = if negative { "-" } else { "" };
    let mut text = format!("{sign}{hours:02}:{minute:02}:{second:02}");
    if len == 12 {
        let micros = reader.read_int4()?;
        text.push_str(&format!(".{micros:06}"));
    }
    Ok(text)
}
