pub mod onnx_face_locator;
