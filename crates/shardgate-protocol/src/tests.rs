#[cfg(test)]
mod tests {
    use crate::backend::{write_packet, write_packets};
    use crate::binary_row::encode_binary_row;
    use crate::execute::decode_execute_parameters;
    use crate::frontend::read_packet;
    use crate::messages::{
        ColumnType, CommandPacket, Packet, ParameterType, ServerPacket, COM_STMT_EXECUTE,
        COM_STMT_PREPARE,
    };
    use crate::payload::PacketPayload;
    use bytes::Bytes;
    use shardgate_core::types::DataValue;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn framed_packet_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let packet = Packet {
            sequence_id: 4,
            payload: Bytes::from_static(b"\x03SELECT 1"),
        };
        write_packet(&mut server, &packet).await.expect("write");
        let mut header = [0u8; 4];
        client.read_exact(&mut header).await.expect("header");
        assert_eq!(header, [9, 0, 0, 4]);
        let mut body = [0u8; 9];
        client.read_exact(&mut body).await.expect("body");
        assert_eq!(&body, b"\x03SELECT 1");
    }

    #[tokio::test]
    async fn read_packet_returns_none_on_closed_stream() {
        let (client, mut server) = tokio::io::duplex(16);
        drop(client);
        assert!(read_packet(&mut server).await.expect("read").is_none());
    }

    #[tokio::test]
    async fn row_packets_are_framed_with_their_sequence_ids() {
        let (mut client, mut server) = tokio::io::duplex(128);
        let rows = vec![
            encode_binary_row(5, 2, &[DataValue::Int64(7), DataValue::Null]).expect("row"),
            encode_binary_row(6, 2, &[DataValue::Null, DataValue::String("z".into())])
                .expect("row"),
        ];
        write_packets(&mut server, &rows).await.expect("write");
        let first = read_packet(&mut client).await.expect("read").expect("packet");
        assert_eq!(first.sequence_id, 5);
        assert_eq!(&first.payload[..], &[0x00, 0b0000_1000, 1, b'7']);
        let second = read_packet(&mut client).await.expect("read").expect("packet");
        assert_eq!(second.sequence_id, 6);
        assert_eq!(&second.payload[..], &[0x00, 0b0000_0100, 1, b'z']);
    }

    #[tokio::test]
    async fn parses_prepare_command_from_the_wire() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let sql = b"SELECT * FROM t WHERE id=?";
        let mut frame = vec![(sql.len() + 1) as u8, 0, 0, 0, COM_STMT_PREPARE];
        frame.extend_from_slice(sql);
        client.write_all(&frame).await.expect("write");
        let packet = read_packet(&mut server).await.expect("read").expect("packet");
        match CommandPacket::parse(packet.payload).expect("parse") {
            CommandPacket::StmtPrepare { sql } => assert_eq!(sql, "SELECT * FROM t WHERE id=?"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    fn execute_payload(statement_id: u32, body: &[u8]) -> Bytes {
        let mut payload = PacketPayload::new();
        payload.write_int1(COM_STMT_EXECUTE);
        payload.write_int4(statement_id);
        payload.write_int1(0);
        payload.write_int4(1);
        payload.write_bytes(body);
        payload.freeze()
    }

    #[test]
    fn decodes_typed_execute_parameters() {
        let mut body = PacketPayload::new();
        body.write_int1(0b0000_0010); // second param is null
        body.write_int1(1);
        body.write_int1(ColumnType::LongLong.code());
        body.write_int1(0);
        body.write_int1(ColumnType::VarString.code());
        body.write_int1(0);
        body.write_int1(ColumnType::Tiny.code());
        body.write_int1(0x80);
        body.write_int8(42);
        body.write_int1(200);
        let payload = execute_payload(9, &body.freeze());

        let (statement_id, body) = match CommandPacket::parse(payload).expect("parse") {
            CommandPacket::StmtExecute {
                statement_id, body, ..
            } => (statement_id, body),
            other => panic!("unexpected command {other:?}"),
        };
        assert_eq!(statement_id, 9);
        let (values, types) = decode_execute_parameters(body, 3, None).expect("decode");
        assert_eq!(
            values,
            vec![DataValue::Int64(42), DataValue::Null, DataValue::UInt64(200)]
        );
        assert_eq!(
            types[2],
            ParameterType {
                column_type: ColumnType::Tiny,
                unsigned: true
            }
        );
    }

    #[test]
    fn reuses_previously_bound_types() {
        let previous = vec![ParameterType {
            column_type: ColumnType::VarString,
            unsigned: false,
        }];
        let mut body = PacketPayload::new();
        body.write_int1(0);
        body.write_int1(0);
        body.write_string_lenenc("alice");
        let (values, _) =
            decode_execute_parameters(body.freeze(), 1, Some(&previous)).expect("decode");
        assert_eq!(values, vec![DataValue::String("alice".into())]);
    }

    #[test]
    fn missing_types_are_a_protocol_error() {
        let body = Bytes::from_static(&[0x00, 0x00]);
        assert!(decode_execute_parameters(body, 1, None).is_err());
    }

    #[test]
    fn decodes_temporal_parameters_as_text() {
        let mut body = PacketPayload::new();
        body.write_int1(0);
        body.write_int1(1);
        body.write_int1(ColumnType::DateTime.code());
        body.write_int1(0);
        body.write_int1(ColumnType::Time.code());
        body.write_int1(0);
        body.write_int1(7);
        body.write_int2(2024);
        body.write_int1(3);
        body.write_int1(9);
        body.write_int1(13);
        body.write_int1(5);
        body.write_int1(59);
        body.write_int1(8);
        body.write_int1(1);
        body.write_int4(1);
        body.write_int1(2);
        body.write_int1(30);
        body.write_int1(0);
        let (values, _) = decode_execute_parameters(body.freeze(), 2, None).expect("decode");
        assert_eq!(
            values,
            vec![
                DataValue::String("2024-03-09 13:05:59".into()),
                DataValue::String("-26:30:00".into()),
            ]
        );
    }

    #[test]
    fn err_packet_layout() {
        let packet = ServerPacket::Err {
            code: 1243,
            sql_state: "HY000".into(),
            message: "unknown".into(),
        }
        .into_packet(1);
        assert_eq!(packet.sequence_id, 1);
        assert_eq!(&packet.payload[..3], &[0xff, 0xdb, 0x04]);
        assert_eq!(&packet.payload[3..9], b"#HY000");
        assert_eq!(&packet.payload[9..], b"unknown");
    }

    #[test]
    fn prepare_ok_layout() {
        let packet = ServerPacket::PrepareOk {
            statement_id: 3,
            num_columns: 2,
            num_params: 1,
        }
        .into_packet(1);
        assert_eq!(
            &packet.payload[..],
            &[0x00, 3, 0, 0, 0, 2, 0, 1, 0, 0, 0, 0]
        );
    }

    #[test]
    fn handshake_advertises_native_password() {
        let packet = ServerPacket::Handshake {
            connection_id: 1,
            server_version: "5.7.0-shardgate".into(),
            scramble: [7u8; 20],
        }
        .into_packet(0);
        assert_eq!(packet.payload[0], 10);
        assert!(packet.payload.ends_with(b"mysql_native_password\0"));
    }
}
