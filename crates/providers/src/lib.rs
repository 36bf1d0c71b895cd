pub mod puml_server;
