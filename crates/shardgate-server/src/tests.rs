#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::context::ProxyContext;
    use crate::coordinator::PreviewBackend;
    use crate::server::reject_connection;
    use crate::session::{wire_count, Session};
    use bytes::Bytes;
    use shardgate_core::error::ProxyError;
    use shardgate_core::registry::StatementRegistry;
    use shardgate_protocol::backend::write_packet;
    use shardgate_protocol::frontend::read_packet;
    use shardgate_protocol::messages::{
        ColumnType, Packet, CLIENT_PROTOCOL_41, CLIENT_SECURE_CONNECTION, COM_PING, COM_QUIT,
        COM_STMT_EXECUTE, COM_STMT_PREPARE,
    };
    use shardgate_protocol::payload::{PacketPayload, PayloadReader};
    use std::sync::Arc;
    use tokio::io::DuplexStream;

    const CONFIG: &str = r#"
[server]
listen_addr = "127.0.0.1:0"
max_connections = 4

[sharding]
data_sources = ["ds0", "ds1"]

[[sharding.tables]]
logic_table = "t_order"
sharding_column = "user_id"
actual_table_count = 4

[metrics]
enabled = false
listen_addr = "127.0.0.1:0"
"#;

    fn context() -> Arc<ProxyContext> {
        let config = Config::from_toml(CONFIG).expect("config");
        Arc::new(ProxyContext::new(
            &config,
            Arc::new(StatementRegistry::new()),
            Arc::new(PreviewBackend),
        ))
    }

    async fn send(client: &mut DuplexStream, sequence_id: u8, payload: Bytes) {
        write_packet(
            client,
            &Packet {
                sequence_id,
                payload,
            },
        )
        .await
        .expect("send");
    }

    async fn recv(client: &mut DuplexStream) -> Packet {
        read_packet(client).await.expect("read").expect("packet")
    }

    async fn connect(client: &mut DuplexStream) {
        let greeting = recv(client).await;
        assert_eq!(greeting.sequence_id, 0);
        assert_eq!(greeting.payload[0], 10);

        let mut response = PacketPayload::new();
        response.write_int4(CLIENT_PROTOCOL_41 | CLIENT_SECURE_CONNECTION);
        response.write_int4(1 << 24);
        response.write_int1(45);
        response.write_zero(23);
        response.write_string_nul("app");
        response.write_int1(0);
        send(client, 1, response.freeze()).await;

        let ok = recv(client).await;
        assert_eq!(ok.sequence_id, 2);
        assert_eq!(ok.payload[0], 0x00);
    }

    fn prepare_payload(sql: &str) -> Bytes {
        let mut payload = PacketPayload::new();
        payload.write_int1(COM_STMT_PREPARE);
        payload.write_string_eof(sql);
        payload.freeze()
    }

    fn execute_payload(statement_id: u32, user_id: i64, bind_types: bool) -> Bytes {
        let mut payload = PacketPayload::new();
        payload.write_int1(COM_STMT_EXECUTE);
        payload.write_int4(statement_id);
        payload.write_int1(0);
        payload.write_int4(1);
        payload.write_int1(0);
        if bind_types {
            payload.write_int1(1);
            payload.write_int1(ColumnType::LongLong.code());
            payload.write_int1(0);
        } else {
            payload.write_int1(0);
        }
        payload.write_int8(user_id as u64);
        payload.freeze()
    }

    fn row_values(packet: &Packet) -> Vec<String> {
        let mut reader = PayloadReader::new(packet.payload.clone());
        assert_eq!(reader.read_int1().expect("header"), 0x00);
        assert_eq!(reader.read_int1().expect("bitmap"), 0x00);
        (0..3)
            .map(|_| {
                let raw = reader.read_bytes_lenenc().expect("value");
                String::from_utf8(raw.to_vec()).expect("utf8")
            })
            .collect()
    }

    #[tokio::test]
    async fn prepare_and_execute_over_the_wire() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let session = Session::new(context());
        let handle = tokio::spawn(async move { session.run(&mut server).await });
        connect(&mut client).await;

        send(&mut client, 0, prepare_payload("SELECT * FROM t_order WHERE user_id = ?")).await;
        let prepare_ok = recv(&mut client).await;
        assert_eq!(prepare_ok.sequence_id, 1);
        let mut reader = PayloadReader::new(prepare_ok.payload.clone());
        assert_eq!(reader.read_int1().expect("status"), 0x00);
        let statement_id = reader.read_int4().expect("id");
        assert_eq!(reader.read_int2().expect("columns"), 3);
        assert_eq!(reader.read_int2().expect("params"), 1);
        // one param definition + EOF, three column definitions + EOF
        let mut last = prepare_ok.sequence_id;
        for _ in 0..6 {
            let packet = recv(&mut client).await;
            assert_eq!(packet.sequence_id, last + 1);
            last = packet.sequence_id;
        }

        send(&mut client, 0, execute_payload(statement_id, 42, true)).await;
        let column_count = recv(&mut client).await;
        assert_eq!(&column_count.payload[..], &[3]);
        for _ in 0..3 {
            recv(&mut client).await;
        }
        let eof = recv(&mut client).await;
        assert_eq!(eof.payload[0], 0xfe);
        let row = recv(&mut client).await;
        assert_eq!(row.sequence_id, 6);
        assert_eq!(
            row_values(&row),
            vec![
                "ds0".to_string(),
                "SELECT * FROM t_order_2 WHERE user_id = ?".to_string(),
                "42".to_string(),
            ]
        );
        let eof = recv(&mut client).await;
        assert_eq!(eof.payload[0], 0xfe);

        // types are not resent on the second execution
        send(&mut client, 0, execute_payload(statement_id, 5, false)).await;
        for _ in 0..5 {
            recv(&mut client).await;
        }
        let row = recv(&mut client).await;
        assert_eq!(row_values(&row)[0], "ds1");
        assert_eq!(row_values(&row)[1], "SELECT * FROM t_order_1 WHERE user_id = ?");
        recv(&mut client).await;

        send(&mut client, 0, Bytes::from_static(&[COM_QUIT])).await;
        handle.await.expect("join").expect("session");
    }

    #[tokio::test]
    async fn unknown_statement_id_returns_error_and_keeps_connection() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let session = Session::new(context());
        let handle = tokio::spawn(async move { session.run(&mut server).await });
        connect(&mut client).await;

        send(&mut client, 0, execute_payload(99, 1, true)).await;
        let err = recv(&mut client).await;
        assert_eq!(err.payload[0], 0xff);
        assert_eq!(u16::from_le_bytes([err.payload[1], err.payload[2]]), 1243);

        send(&mut client, 0, Bytes::from_static(&[COM_PING])).await;
        let ok = recv(&mut client).await;
        assert_eq!(ok.payload[0], 0x00);

        drop(client);
        handle.await.expect("join").expect("session");
    }

    #[tokio::test]
    async fn routing_failure_is_reported_as_error_packet() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let session = Session::new(context());
        let handle = tokio::spawn(async move { session.run(&mut server).await });
        connect(&mut client).await;

        send(&mut client, 0, prepare_payload("INSERT INTO t_order (order_id) VALUES (?)")).await;
        let prepare_ok = recv(&mut client).await;
        let statement_id = u32::from_le_bytes([
            prepare_ok.payload[1],
            prepare_ok.payload[2],
            prepare_ok.payload[3],
            prepare_ok.payload[4],
        ]);
        for _ in 0..6 {
            recv(&mut client).await;
        }
        send(&mut client, 0, execute_payload(statement_id, 1, true)).await;
        let err = recv(&mut client).await;
        assert_eq!(err.payload[0], 0xff);
        assert_eq!(u16::from_le_bytes([err.payload[1], err.payload[2]]), 1105);

        send(&mut client, 0, Bytes::from_static(&[COM_QUIT])).await;
        handle.await.expect("join").expect("session");
    }

    #[tokio::test]
    async fn connection_over_limit_gets_too_many_connections() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        reject_connection(&mut server, 4).await.expect("reject");
        drop(server);
        let err = recv(&mut client).await;
        assert_eq!(err.sequence_id, 0);
        assert_eq!(err.payload[0], 0xff);
        assert_eq!(u16::from_le_bytes([err.payload[1], err.payload[2]]), 1040);
        assert_eq!(&err.payload[3..9], b"#08004");
        assert!(read_packet(&mut client).await.expect("read").is_none());
    }

    #[test]
    fn prepare_counts_beyond_two_bytes_are_rejected() {
        assert_eq!(wire_count(65_535, "parameters").expect("fits"), u16::MAX);
        let err = wire_count(65_536, "parameters").expect_err("too many");
        assert!(matches!(err, ProxyError::NotSupported(_)));
        assert_eq!(err.error_code(), 1047);
    }

    #[tokio::test]
    async fn repeated_prepare_reuses_statement_id() {
        let context = context();
        let (first, _) = context
            .prepare("SELECT * FROM t_order WHERE user_id = ?")
            .expect("prepare");
        let (second, statement) = context
            .prepare("SELECT * FROM t_order WHERE user_id = ?")
            .expect("prepare");
        assert_eq!(first, second);
        assert_eq!(statement.parameter_count, 1);
        assert_eq!(context.registry.num_columns(first).expect("columns"), 3);
        assert!(Arc::ptr_eq(
            &statement,
            &context.statement(first).expect("statement")
        ));
    }

    #[tokio::test]
    async fn invalid_sql_is_a_sql_error() {
        let context = context();
        let err = context.prepare("SELEC nothing").err().expect("error");
        assert!(matches!(err, ProxyError::Sql(_)));
        assert!(matches!(
            context.statement(12345).err().expect("error"),
            ProxyError::UnknownStatementId(12345)
        ));
    }
}
